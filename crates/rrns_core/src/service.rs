//! Encryption service contract
//!
//! The pipeline consumes key generation, encrypt/decrypt, and homomorphic
//! add/multiply through this trait; all key material and ciphertexts are
//! opaque serialized blobs as far as the core is concerned. A real
//! implementation wraps an HE library; [`ClearService`] is the in-crate
//! reference implementation used by tests and the CLI.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ServiceError;

/// An opaque serialized ciphertext blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext(Vec<u8>);

impl Ciphertext {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Opaque serialized public key.
#[derive(Debug, Clone)]
pub struct PublicKey(pub Vec<u8>);

/// Opaque serialized secret key.
#[derive(Debug, Clone)]
pub struct SecretKey(pub Vec<u8>);

/// Opaque auxiliary key material (relinearization / rotation keys).
#[derive(Debug, Clone)]
pub struct EvalKey(pub Vec<u8>);

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: PublicKey,
    pub secret: SecretKey,
}

/// External encryption collaborator.
///
/// Every call blocks until complete; the pipeline assumes exclusive
/// single-writer access to whatever context sits behind an implementation.
pub trait EncryptionService {
    /// Name of this service (for logging).
    fn name(&self) -> &'static str;

    fn keygen(&self) -> Result<KeyPair, ServiceError>;

    /// Generate the relinearization key needed by homomorphic multiply.
    fn eval_mult_keygen(&self, secret: &SecretKey) -> Result<EvalKey, ServiceError>;

    /// Generate rotation keys for the given slot indices.
    fn eval_rotation_keygen(
        &self,
        secret: &SecretKey,
        indices: &[i32],
    ) -> Result<EvalKey, ServiceError>;

    fn encrypt(&self, public: &PublicKey, values: &[i64]) -> Result<Ciphertext, ServiceError>;

    fn decrypt(&self, secret: &SecretKey, ciphertext: &Ciphertext)
        -> Result<Vec<i64>, ServiceError>;

    fn hom_add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, ServiceError>;

    fn hom_mult(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, ServiceError>;

    /// Size-reduction step applied before any staging write.
    fn compress(&self, ciphertext: &Ciphertext, level: u32) -> Result<Ciphertext, ServiceError>;
}

const CLEAR_MAGIC: &[u8; 4] = b"CLR1";
const CLEAR_KEY_TAG: u8 = 0x4b;

/// Reference implementation with no actual cryptography.
///
/// Slots are packed little-endian behind a tagged header and every
/// homomorphic operation works slot-wise modulo a plaintext modulus, so the
/// arithmetic behavior (including results landing in `[0, t)` rather than
/// `[0, m_i)`, which is what makes `rebase` necessary) matches a real
/// scheme. Key pairs carry a matching id so decrypting with the wrong
/// secret key fails loudly.
pub struct ClearService {
    plaintext_modulus: u64,
    next_key_id: AtomicU64,
}

impl ClearService {
    /// Default plaintext modulus 65537, matching the usual BGV setup.
    pub fn new() -> Self {
        Self::with_plaintext_modulus(65537)
    }

    pub fn with_plaintext_modulus(plaintext_modulus: u64) -> Self {
        Self {
            plaintext_modulus,
            next_key_id: AtomicU64::new(1),
        }
    }

    pub fn plaintext_modulus(&self) -> u64 {
        self.plaintext_modulus
    }

    fn key_id(key: &[u8], what: &str) -> Result<u64, ServiceError> {
        if key.len() != 9 || key[0] != CLEAR_KEY_TAG {
            return Err(ServiceError::MalformedKey(format!(
                "{what} is not a ClearService key"
            )));
        }
        let mut id = [0u8; 8];
        id.copy_from_slice(&key[1..9]);
        Ok(u64::from_le_bytes(id))
    }

    fn parse(ciphertext: &Ciphertext) -> Result<(u64, Vec<i64>), ServiceError> {
        let bytes = ciphertext.as_bytes();
        if bytes.len() < 20 || &bytes[0..4] != CLEAR_MAGIC {
            return Err(ServiceError::MalformedCiphertext(
                "missing ClearService header".into(),
            ));
        }

        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[4..12]);
        let key_id = u64::from_le_bytes(word);
        word.copy_from_slice(&bytes[12..20]);
        let count = u64::from_le_bytes(word) as usize;

        if bytes.len() != 20 + count * 8 {
            return Err(ServiceError::MalformedCiphertext(format!(
                "expected {} payload bytes, found {}",
                count * 8,
                bytes.len() - 20
            )));
        }

        let mut slots = Vec::with_capacity(count);
        for chunk in bytes[20..].chunks_exact(8) {
            word.copy_from_slice(chunk);
            slots.push(i64::from_le_bytes(word));
        }

        Ok((key_id, slots))
    }

    fn pack(&self, key_id: u64, slots: &[i64]) -> Ciphertext {
        let mut bytes = Vec::with_capacity(20 + slots.len() * 8);
        bytes.extend_from_slice(CLEAR_MAGIC);
        bytes.extend_from_slice(&key_id.to_le_bytes());
        bytes.extend_from_slice(&(slots.len() as u64).to_le_bytes());
        for &v in slots {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        Ciphertext::from_bytes(bytes)
    }

    fn reduce(&self, v: i64) -> i64 {
        (v as i128).rem_euclid(self.plaintext_modulus as i128) as i64
    }

    fn binary_op(
        &self,
        a: &Ciphertext,
        b: &Ciphertext,
        op: impl Fn(i128, i128) -> i128,
    ) -> Result<Ciphertext, ServiceError> {
        let (id_a, slots_a) = Self::parse(a)?;
        let (id_b, slots_b) = Self::parse(b)?;

        if id_a != id_b {
            return Err(ServiceError::Failure(
                "ciphertexts were produced under different keys".into(),
            ));
        }
        // Packed schemes treat absent trailing slots as zeros.
        let len = slots_a.len().max(slots_b.len());
        let t = self.plaintext_modulus as i128;
        let slots: Vec<i64> = (0..len)
            .map(|i| {
                let x = slots_a.get(i).copied().unwrap_or(0) as i128;
                let y = slots_b.get(i).copied().unwrap_or(0) as i128;
                op(x, y).rem_euclid(t) as i64
            })
            .collect();

        Ok(self.pack(id_a, &slots))
    }
}

impl Default for ClearService {
    fn default() -> Self {
        Self::new()
    }
}

impl EncryptionService for ClearService {
    fn name(&self) -> &'static str {
        "clear"
    }

    fn keygen(&self) -> Result<KeyPair, ServiceError> {
        let id = self.next_key_id.fetch_add(1, Ordering::Relaxed);
        let mut key = vec![CLEAR_KEY_TAG];
        key.extend_from_slice(&id.to_le_bytes());

        Ok(KeyPair {
            public: PublicKey(key.clone()),
            secret: SecretKey(key),
        })
    }

    fn eval_mult_keygen(&self, secret: &SecretKey) -> Result<EvalKey, ServiceError> {
        let id = Self::key_id(&secret.0, "secret key")?;
        let mut key = b"mult".to_vec();
        key.extend_from_slice(&id.to_le_bytes());
        Ok(EvalKey(key))
    }

    fn eval_rotation_keygen(
        &self,
        secret: &SecretKey,
        indices: &[i32],
    ) -> Result<EvalKey, ServiceError> {
        let id = Self::key_id(&secret.0, "secret key")?;
        let mut key = b"rot ".to_vec();
        key.extend_from_slice(&id.to_le_bytes());
        for &i in indices {
            key.extend_from_slice(&i.to_le_bytes());
        }
        Ok(EvalKey(key))
    }

    fn encrypt(&self, public: &PublicKey, values: &[i64]) -> Result<Ciphertext, ServiceError> {
        let id = Self::key_id(&public.0, "public key")?;
        let slots: Vec<i64> = values.iter().map(|&v| self.reduce(v)).collect();
        Ok(self.pack(id, &slots))
    }

    fn decrypt(
        &self,
        secret: &SecretKey,
        ciphertext: &Ciphertext,
    ) -> Result<Vec<i64>, ServiceError> {
        let sk_id = Self::key_id(&secret.0, "secret key")?;
        let (ct_id, slots) = Self::parse(ciphertext)?;

        if sk_id != ct_id {
            return Err(ServiceError::Failure(
                "secret key does not match ciphertext".into(),
            ));
        }

        Ok(slots)
    }

    fn hom_add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, ServiceError> {
        self.binary_op(a, b, |x, y| x + y)
    }

    fn hom_mult(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, ServiceError> {
        self.binary_op(a, b, |x, y| x * y)
    }

    fn compress(&self, ciphertext: &Ciphertext, _level: u32) -> Result<Ciphertext, ServiceError> {
        // No modulus chain to shrink here; validate and pass through.
        Self::parse(ciphertext)?;
        Ok(ciphertext.clone())
    }
}
