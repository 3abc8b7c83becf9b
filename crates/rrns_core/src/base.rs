//! Modulus base selection
//!
//! Generates the ordered, pairwise-coprime modulus set ("base") used for
//! residue decomposition, and wraps it with its cached dynamic range.

use crate::error::CodecError;

/// Returns every prime `p` with `low <= p < high`, ascending.
///
/// Primality is decided by trial division over `2..=p/2`; 0 and 1 are
/// rejected. Intentionally naive: correctness, not speed, is the contract.
/// An empty range (`low >= high`) yields an empty vector.
pub fn select_primes(low: u64, high: u64) -> Vec<u64> {
    let mut primes = Vec::new();

    for candidate in low..high {
        if is_prime(candidate) {
            primes.push(candidate);
        }
    }

    primes
}

fn is_prime(n: u64) -> bool {
    if n == 0 || n == 1 {
        return false;
    }

    for d in 2..=n / 2 {
        if n % d == 0 {
            return false;
        }
    }

    true
}

/// An ordered modulus set with its cached dynamic range `M = prod(m_i)`.
///
/// Immutable once built: a pipeline run selects its base once and shares it
/// by reference for every chunk. Construction validates structure (no 0, no
/// 1, strictly increasing, product representable); pairwise coprimality is
/// checked at decode time, where a violation is actually observable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RnsBase {
    moduli: Vec<u64>,
    product: u128,
}

impl RnsBase {
    /// Build a base from explicit moduli.
    pub fn new(moduli: Vec<u64>) -> Result<Self, CodecError> {
        if moduli.is_empty() {
            return Err(CodecError::InvalidBase("empty modulus set".into()));
        }

        let mut product: u128 = 1;
        let mut prev: u64 = 0;

        for &m in &moduli {
            if m < 2 {
                return Err(CodecError::InvalidBase(format!("modulus {m} is not allowed")));
            }
            if m <= prev {
                return Err(CodecError::InvalidBase(format!(
                    "moduli must be strictly increasing, {m} follows {prev}"
                )));
            }
            prev = m;

            product = product.checked_mul(m as u128).ok_or_else(|| {
                CodecError::InvalidBase("dynamic range overflows u128".into())
            })?;
        }

        Ok(Self { moduli, product })
    }

    /// Build a base from every prime in `[low, high)`.
    pub fn from_range(low: u64, high: u64) -> Result<Self, CodecError> {
        Self::new(select_primes(low, high))
    }

    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    pub fn len(&self) -> usize {
        self.moduli.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moduli.is_empty()
    }

    /// The dynamic range `M`: values at or above it alias mod `M`.
    pub fn product(&self) -> u128 {
        self.product
    }
}
