//! RRNS Core Library
//!
//! Redundant Residue Number System (RRNS) re-encoding for homomorphic
//! encryption workflows: numeric samples, or the serialized bytes of
//! opaque ciphertexts, are re-expressed as residue tuples modulo a set of
//! pairwise-coprime moduli and staged between calls to an external
//! encryption service.
//!
//! # Key Components
//!
//! - [`base`] - Modulus base selection and the validated [`RnsBase`]
//! - [`codec`] - Residue encode, CRT decode, and `rebase`
//! - [`service`] - The external encryption-service contract
//! - [`staging`] - Named blob persistence and the staged-blob format
//! - [`pipeline`] - Chunked batch orchestration over both contracts
//! - [`dataset`] - Whitespace-token dataset files
//!
//! The encryption primitives themselves are out of scope: the pipeline
//! consumes them through [`service::EncryptionService`] and stages
//! artifacts through [`staging::StagingStore`].

pub mod base;
pub mod codec;
pub mod dataset;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod staging;

pub use base::{select_primes, RnsBase};
pub use codec::{decode, encode, rebase};
pub use dataset::read_dataset;
pub use error::{CodecError, DatasetError, PipelineError, ServiceError, StagingError};
pub use pipeline::{chunk, BatchPipeline, InsertionMode, PipelineConfig, RunReport};
pub use service::{
    Ciphertext, ClearService, EncryptionService, EvalKey, KeyPair, PublicKey, SecretKey,
};
pub use staging::{BlobKind, DirStore, MemoryStore, StagedBlob, StagingStore};
