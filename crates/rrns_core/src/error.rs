//! Error types for the residue codec and staging pipeline

use thiserror::Error;

/// Errors from base construction and residue encode/decode
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid base: {0}")]
    InvalidBase(String),

    #[error("cannot encode negative sample {0}")]
    InvalidSample(i64),

    #[error("partial product {partial} is not invertible modulo {modulus}")]
    NonInvertibleModulus { partial: u128, modulus: u64 },

    #[error("residue vector length mismatch: base has {expected} moduli, got {actual} residues")]
    ResidueLengthMismatch { expected: usize, actual: usize },
}

/// Errors from the staging store and the staged-blob format
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no staged blob named {0:?}")]
    MissingBlob(String),

    #[error("malformed staged blob: {0}")]
    MalformedBlob(String),
}

/// Opaque failures surfaced from the external encryption service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("encryption service failure: {0}")]
    Failure(String),

    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("malformed key material: {0}")]
    MalformedKey(String),
}

/// Errors from dataset file parsing
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("dataset I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unparseable dataset token {token:?} at position {position}")]
    BadToken { token: String, position: usize },
}

/// Pipeline orchestration errors. Fail-fast: the first one aborts the run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("chunk size must be non-zero")]
    InvalidChunkSize,
}
