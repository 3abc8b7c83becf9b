//! Batch pipeline
//!
//! Chunks a dataset and drives each chunk through encode/encrypt/stage/
//! decode, coordinating with the encryption service and the staging store.
//! Two insertion points for the residue codec exist:
//!
//! - **PreEncryption**: each sample is decomposed into residues first and
//!   every residue coordinate is encrypted on its own, so the homomorphic
//!   operations run over residues.
//! - **PostEncryption**: whole chunks are encrypted and the codec is applied
//!   to the serialized ciphertext bytes purely as a staging transport; the
//!   round trip must be lossless.
//!
//! Chunks are consumed two at a time (`2j`, `2j+1`) for the aggregate/verify
//! step. The pipeline is synchronous and fail-fast: the first staging or
//! service failure aborts the run, leaving earlier chunks' staged artifacts
//! in place.

use log::{debug, warn};

use crate::base::RnsBase;
use crate::codec::{decode, encode, rebase};
use crate::error::PipelineError;
use crate::service::{Ciphertext, EncryptionService, KeyPair};
use crate::staging::{
    aggregate_name, ciphertext_name, residue_name, BlobKind, StagedBlob, StagingStore,
};

/// Where the residue codec sits relative to encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionMode {
    PreEncryption,
    PostEncryption,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunk_size: usize,
    pub mode: InsertionMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            mode: InsertionMode::PostEncryption,
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: InsertionMode,
    pub samples: usize,
    pub chunks: usize,
    pub pairs: usize,
    pub verified_pairs: usize,
    /// Index of the odd final chunk excluded from the aggregate/verify
    /// phase, if the chunk count was odd.
    pub truncated_chunk: Option<usize>,
}

/// Split samples into chunks of `chunk_size` in order; the final chunk may
/// be shorter.
pub fn chunk(samples: &[i64], chunk_size: usize) -> Result<Vec<Vec<i64>>, PipelineError> {
    if chunk_size == 0 {
        return Err(PipelineError::InvalidChunkSize);
    }

    Ok(samples.chunks(chunk_size).map(<[i64]>::to_vec).collect())
}

/// Batch pipeline over an encryption service and a staging store.
///
/// The base is selected once at construction and reused, immutable, for
/// every chunk of the run.
pub struct BatchPipeline<S: EncryptionService, T: StagingStore> {
    config: PipelineConfig,
    base: RnsBase,
    service: S,
    store: T,
}

impl<S: EncryptionService, T: StagingStore> BatchPipeline<S, T> {
    pub fn new(config: PipelineConfig, base: RnsBase, service: S, store: T) -> Self {
        Self {
            config,
            base,
            service,
            store,
        }
    }

    pub fn base(&self) -> &RnsBase {
        &self.base
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    /// Run the whole dataset through the configured mode.
    pub fn run(&mut self, samples: &[i64]) -> Result<RunReport, PipelineError> {
        let chunks = chunk(samples, self.config.chunk_size)?;
        debug!(
            "pipeline start: {} samples, {} chunks, mode {:?}, service {}",
            samples.len(),
            chunks.len(),
            self.config.mode,
            self.service.name()
        );

        let keys = self.service.keygen()?;
        self.service.eval_mult_keygen(&keys.secret)?;
        self.service
            .eval_rotation_keygen(&keys.secret, &[1, 2, -1, -2])?;

        let truncated_chunk = if chunks.len() % 2 == 1 {
            let last = chunks.len() - 1;
            warn!(
                "odd chunk count {}: chunk {last} has no pair and is excluded \
                 from the aggregate/verify phase",
                chunks.len()
            );
            Some(last)
        } else {
            None
        };

        let verified_pairs = match self.config.mode {
            InsertionMode::PreEncryption => self.run_pre_encryption(&keys, &chunks)?,
            InsertionMode::PostEncryption => self.run_post_encryption(&keys, &chunks)?,
        };

        Ok(RunReport {
            mode: self.config.mode,
            samples: samples.len(),
            chunks: chunks.len(),
            pairs: chunks.len() / 2,
            verified_pairs,
            truncated_chunk,
        })
    }

    /// Residues individually encrypted; homomorphism exercised on residues.
    fn run_pre_encryption(
        &mut self,
        keys: &KeyPair,
        chunks: &[Vec<i64>],
    ) -> Result<usize, PipelineError> {
        let mut verified_pairs = 0;

        for j in 0..chunks.len() / 2 {
            let (left, right) = (&chunks[2 * j], &chunks[2 * j + 1]);
            let mut pair_ok = true;

            for (&s1, &s2) in left.iter().zip(right) {
                let r1 = encode(s1, &self.base)?;
                let r2 = encode(s2, &self.base)?;

                let mut sum_residues = Vec::with_capacity(self.base.len());
                let mut mult_residues = Vec::with_capacity(self.base.len());

                // One single-slot ciphertext per residue coordinate.
                for i in 0..self.base.len() {
                    let c1 = self.encrypt_compressed(keys, &[r1[i] as i64])?;
                    let c2 = self.encrypt_compressed(keys, &[r2[i] as i64])?;

                    let sum_ct = self.service.hom_add(&c1, &c2)?;
                    let mult_ct = self.service.hom_mult(&c1, &c2)?;

                    sum_residues.push(first_slot(self.service.decrypt(&keys.secret, &sum_ct)?));
                    mult_residues.push(first_slot(self.service.decrypt(&keys.secret, &mult_ct)?));
                }

                // Decrypted values are reduced by the service's plaintext
                // modulus, not by the base; fold them back before CRT.
                rebase(&mut sum_residues, &self.base);
                rebase(&mut mult_residues, &self.base);

                let decoded_sum = decode(&self.base, &to_unsigned(&sum_residues))?;
                let decoded_mult = decode(&self.base, &to_unsigned(&mult_residues))?;

                let m = self.base.product();
                if decoded_sum != (s1 as u128 + s2 as u128) % m
                    || decoded_mult != (s1 as u128 * s2 as u128) % m
                {
                    pair_ok = false;
                }
            }

            debug!("pair {j}: pre-encryption verify {}", if pair_ok { "ok" } else { "FAILED" });
            if pair_ok {
                verified_pairs += 1;
            }
        }

        Ok(verified_pairs)
    }

    /// RNS as a staging codec over already-encrypted bytes.
    fn run_post_encryption(
        &mut self,
        keys: &KeyPair,
        chunks: &[Vec<i64>],
    ) -> Result<usize, PipelineError> {
        let mut originals = Vec::with_capacity(chunks.len());
        let mut rebuilt = Vec::with_capacity(chunks.len());

        for (i, samples) in chunks.iter().enumerate() {
            let ciphertext = self.encrypt_compressed(keys, samples)?;
            originals.push(ciphertext.clone());

            // Stage the ciphertext blob.
            let ct_blob = StagedBlob::new(
                BlobKind::Ciphertext,
                1,
                ciphertext.as_bytes().iter().map(|&b| b as u64).collect(),
            )?;
            self.store.put(&ciphertext_name(i), &ct_blob.to_bytes())?;

            // Re-read the staged bytes and encode every byte against the base.
            let staged = StagedBlob::from_bytes(&self.store.get(&ciphertext_name(i))?)?;
            let mut table = Vec::with_capacity(staged.elements.len() * self.base.len());
            for &byte in &staged.elements {
                table.extend(encode(byte as i64, &self.base)?);
            }

            let table_blob = StagedBlob::new(BlobKind::ResidueTable, 8, table)?;
            self.store.put(&residue_name(i), &table_blob.to_bytes())?;

            // Decode the staged residue table back into the byte sequence.
            let table = StagedBlob::from_bytes(&self.store.get(&residue_name(i))?)?;
            let mut bytes = Vec::with_capacity(table.elements.len() / self.base.len());
            for residues in table.elements.chunks(self.base.len()) {
                let value = decode(&self.base, residues)?;
                bytes.push(u8::try_from(value).map_err(|_| {
                    crate::error::StagingError::MalformedBlob(format!(
                        "residue table entry decodes to {value}, not a byte"
                    ))
                })?);
            }

            let agg_blob = StagedBlob::new(
                BlobKind::Aggregate,
                1,
                bytes.iter().map(|&b| b as u64).collect(),
            )?;
            self.store.put(&aggregate_name(i), &agg_blob.to_bytes())?;

            debug!(
                "chunk {i}: staged {} ciphertext bytes through {}-modulus residue table",
                bytes.len(),
                self.base.len()
            );

            rebuilt.push(Ciphertext::from_bytes(bytes));
        }

        // Pairwise aggregate/verify over the rebuilt ciphertexts; the
        // decrypted results must match the unencoded path exactly.
        let mut verified_pairs = 0;
        for j in 0..chunks.len() / 2 {
            let via_rns = self
                .service
                .hom_add(&rebuilt[2 * j], &rebuilt[2 * j + 1])?;
            let direct = self
                .service
                .hom_add(&originals[2 * j], &originals[2 * j + 1])?;

            let via_rns = self.service.decrypt(&keys.secret, &via_rns)?;
            let direct = self.service.decrypt(&keys.secret, &direct)?;

            let pair_ok = via_rns == direct;
            debug!("pair {j}: post-encryption verify {}", if pair_ok { "ok" } else { "FAILED" });
            if pair_ok {
                verified_pairs += 1;
            }
        }

        Ok(verified_pairs)
    }

    fn encrypt_compressed(
        &self,
        keys: &KeyPair,
        values: &[i64],
    ) -> Result<Ciphertext, PipelineError> {
        let ciphertext = self.service.encrypt(&keys.public, values)?;
        Ok(self.service.compress(&ciphertext, 2)?)
    }
}

fn first_slot(slots: Vec<i64>) -> i64 {
    slots.first().copied().unwrap_or(0)
}

fn to_unsigned(values: &[i64]) -> Vec<u64> {
    // rebase has already folded everything into [0, m_i).
    values.iter().map(|&v| v as u64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ClearService;
    use crate::staging::MemoryStore;

    fn small_base() -> RnsBase {
        RnsBase::new(vec![2, 3, 5, 7]).unwrap()
    }

    /// Smallest convenient base whose dynamic range covers a byte.
    fn byte_base() -> RnsBase {
        RnsBase::new(vec![2, 3, 5, 7, 11]).unwrap()
    }

    #[test]
    fn test_chunk_lengths() {
        let samples: Vec<i64> = (0..2500).collect();
        let chunks = chunk(&samples, 1000).unwrap();
        let lengths: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(lengths, vec![1000, 1000, 500]);
        assert_eq!(chunks[2][0], 2000);
    }

    #[test]
    fn test_chunk_exact_multiple() {
        let samples: Vec<i64> = (0..2000).collect();
        let chunks = chunk(&samples, 1000).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].len(), 1000);
    }

    #[test]
    fn test_chunk_size_zero_rejected() {
        assert!(matches!(
            chunk(&[1, 2, 3], 0),
            Err(PipelineError::InvalidChunkSize)
        ));
    }

    #[test]
    fn test_pre_encryption_sums_and_products() {
        let config = PipelineConfig {
            chunk_size: 4,
            mode: InsertionMode::PreEncryption,
        };
        // Product 210; all pairwise sums and products below stay in range.
        let samples = vec![28, 13, 5, 0, 6, 9, 11, 2];
        let mut pipeline = BatchPipeline::new(
            config,
            small_base(),
            ClearService::new(),
            MemoryStore::new(),
        );

        let report = pipeline.run(&samples).unwrap();
        assert_eq!(report.chunks, 2);
        assert_eq!(report.pairs, 1);
        assert_eq!(report.verified_pairs, 1);
        assert_eq!(report.truncated_chunk, None);
    }

    #[test]
    fn test_post_encryption_round_trip_is_lossless() {
        let config = PipelineConfig {
            chunk_size: 3,
            mode: InsertionMode::PostEncryption,
        };
        let samples = vec![28, 13, 7, 100, 200, 300];
        let mut pipeline = BatchPipeline::new(
            config,
            RnsBase::from_range(20, 80).unwrap(),
            ClearService::new(),
            MemoryStore::new(),
        );

        let report = pipeline.run(&samples).unwrap();
        assert_eq!(report.chunks, 2);
        assert_eq!(report.verified_pairs, 1);

        // Every artifact kind was staged for both chunks.
        for i in 0..2 {
            for name in [ciphertext_name(i), residue_name(i), aggregate_name(i)] {
                let blob = StagedBlob::from_bytes(&pipeline.store().get(&name).unwrap()).unwrap();
                assert!(!blob.elements.is_empty());
            }

            // Aggregate must reproduce the staged ciphertext bytes exactly.
            let ct = StagedBlob::from_bytes(
                &pipeline.store().get(&ciphertext_name(i)).unwrap(),
            )
            .unwrap();
            let agg = StagedBlob::from_bytes(
                &pipeline.store().get(&aggregate_name(i)).unwrap(),
            )
            .unwrap();
            assert_eq!(ct.elements, agg.elements);
        }
    }

    #[test]
    fn test_odd_chunk_count_surfaced_as_truncation() {
        let config = PipelineConfig {
            chunk_size: 2,
            mode: InsertionMode::PostEncryption,
        };
        let samples = vec![1, 2, 3, 4, 5];
        let mut pipeline = BatchPipeline::new(
            config,
            byte_base(),
            ClearService::new(),
            MemoryStore::new(),
        );

        let report = pipeline.run(&samples).unwrap();
        assert_eq!(report.chunks, 3);
        assert_eq!(report.pairs, 1);
        assert_eq!(report.truncated_chunk, Some(2));
    }

    #[test]
    fn test_negative_sample_aborts_pre_encryption_run() {
        let config = PipelineConfig {
            chunk_size: 1,
            mode: InsertionMode::PreEncryption,
        };
        let mut pipeline = BatchPipeline::new(
            config,
            small_base(),
            ClearService::new(),
            MemoryStore::new(),
        );

        let err = pipeline.run(&[5, -3]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Codec(crate::error::CodecError::InvalidSample(-3))
        ));
    }

    #[test]
    fn test_short_final_pair_member() {
        // Even chunk count but the second member of the last pair is short.
        let config = PipelineConfig {
            chunk_size: 3,
            mode: InsertionMode::PostEncryption,
        };
        let samples = vec![10, 20, 30, 40, 50];
        let mut pipeline = BatchPipeline::new(
            config,
            byte_base(),
            ClearService::new(),
            MemoryStore::new(),
        );

        let report = pipeline.run(&samples).unwrap();
        assert_eq!(report.chunks, 2);
        assert_eq!(report.verified_pairs, 1);
        assert_eq!(report.truncated_chunk, None);
    }
}
