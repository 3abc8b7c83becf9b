//! Residue codec
//!
//! Encodes integers into residue vectors against an [`RnsBase`] and
//! reconstructs them via the Chinese Remainder Theorem.

use num_integer::Integer;

use crate::base::RnsBase;
use crate::error::CodecError;

/// Decompose a non-negative value into its residues `value mod m_i`.
///
/// Negative input is a contract violation; callers pre-normalize.
pub fn encode(value: i64, base: &RnsBase) -> Result<Vec<u64>, CodecError> {
    if value < 0 {
        return Err(CodecError::InvalidSample(value));
    }

    let v = value as u64;
    Ok(base.moduli().iter().map(|&m| v % m).collect())
}

/// Reconstruct the unique value in `[0, M)` from its residues.
///
/// Uses the classical CRT formula: for each modulus, the partial product
/// `M / m_i` is inverted modulo `m_i` by the extended Euclidean algorithm
/// and the weighted residues are accumulated mod `M`. Fails with
/// [`CodecError::NonInvertibleModulus`] when the base is not pairwise
/// coprime. A value that exceeded `M` at encode time comes back aliased mod
/// `M`; that is the documented contract, not an error.
pub fn decode(base: &RnsBase, residues: &[u64]) -> Result<u128, CodecError> {
    if residues.len() != base.len() {
        return Err(CodecError::ResidueLengthMismatch {
            expected: base.len(),
            actual: residues.len(),
        });
    }

    let product = base.product();
    let mut acc: u128 = 0;

    for (&m, &r) in base.moduli().iter().zip(residues) {
        let partial = product / m as u128;
        let partial_mod = (partial % m as u128) as u64;

        if partial_mod.gcd(&m) != 1 {
            return Err(CodecError::NonInvertibleModulus { partial, modulus: m });
        }

        let inv = mod_inverse(partial_mod, m);
        let weight = ((r % m) as u128 * inv as u128) % m as u128;
        let term = (weight * partial) % product;

        acc = mod_add(acc, term, product);
    }

    Ok(acc)
}

/// Fold a vector of integers into `[0, m_i)` against a parallel base,
/// in place.
///
/// Needed after independent homomorphic processing: the decrypted residues
/// come back reduced by the service's plaintext modulus, not by `m_i`, so
/// they can sit outside their original domain before CRT reconstruction.
pub fn rebase(values: &mut [i64], base: &RnsBase) {
    debug_assert_eq!(values.len(), base.len());

    for (v, &m) in values.iter_mut().zip(base.moduli()) {
        *v = ((*v as i128).rem_euclid(m as i128)) as i64;
    }
}

/// Modular inverse of `a` modulo `m` by the iterative extended Euclidean
/// algorithm, normalized into `[0, m)`. Caller guarantees `gcd(a, m) == 1`.
fn mod_inverse(a: u64, m: u64) -> u64 {
    if m == 1 {
        return 0;
    }

    let m0 = m as i128;
    let (mut a, mut m) = (a as i128, m as i128);
    let (mut x0, mut x1) = (0i128, 1i128);

    while a > 1 {
        let q = a / m;
        let t = m;
        m = a % m;
        a = t;

        let t = x0;
        x0 = x1 - q * x0;
        x1 = t;
    }

    if x1 < 0 {
        x1 += m0;
    }

    x1 as u64
}

/// `(a + b) mod m` without overflow; both inputs already reduced mod `m`.
fn mod_add(a: u128, b: u128, m: u128) -> u128 {
    if a >= m - b {
        a - (m - b)
    } else {
        a + b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    /// Linear-search reconstruction, O(M). Mathematically equivalent to
    /// `decode` but only usable as a differential oracle for tiny bases.
    fn brute_force_decode(base: &RnsBase, residues: &[u64]) -> u128 {
        let mut x: u128 = 0;
        loop {
            let matches = base
                .moduli()
                .iter()
                .zip(residues)
                .all(|(&m, &r)| x % m as u128 == r as u128);
            if matches {
                return x;
            }
            x += 1;
        }
    }

    #[test]
    fn test_known_vector() {
        let base = RnsBase::new(vec![2, 3, 5, 7]).unwrap();
        let residues = encode(123, &base).unwrap();
        assert_eq!(residues, vec![1, 0, 3, 4]);
        assert_eq!(decode(&base, &residues).unwrap(), 123);
    }

    #[test]
    fn test_negative_sample_rejected() {
        let base = RnsBase::new(vec![2, 3, 5, 7]).unwrap();
        assert!(matches!(
            encode(-1, &base),
            Err(CodecError::InvalidSample(-1))
        ));
    }

    #[test]
    fn test_non_coprime_base_fails_decode() {
        let base = RnsBase::new(vec![4, 6]).unwrap();
        let err = decode(&base, &[1, 5]).unwrap_err();
        assert!(matches!(err, CodecError::NonInvertibleModulus { .. }));
    }

    #[test]
    fn test_residue_length_mismatch() {
        let base = RnsBase::new(vec![2, 3, 5]).unwrap();
        let err = decode(&base, &[1, 2]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::ResidueLengthMismatch { expected: 3, actual: 2 }
        ));
    }

    #[test]
    fn test_round_trip_full_range() {
        let base = RnsBase::new(vec![3, 5, 7]).unwrap();
        for x in 0..base.product() as i64 {
            let residues = encode(x, &base).unwrap();
            assert_eq!(decode(&base, &residues).unwrap(), x as u128);
        }
    }

    #[test]
    fn test_round_trip_randomized_default_base() {
        let base = RnsBase::from_range(20, 80).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let x = rng.gen_range(0..i64::MAX);
            let residues = encode(x, &base).unwrap();
            assert_eq!(decode(&base, &residues).unwrap(), x as u128);
        }
    }

    #[test]
    fn test_aliasing_above_dynamic_range() {
        let base = RnsBase::new(vec![3, 5]).unwrap();
        // 17 >= M = 15, silently comes back as 17 mod 15.
        let residues = encode(17, &base).unwrap();
        assert_eq!(decode(&base, &residues).unwrap(), 2);
    }

    #[test]
    fn test_additive_and_multiplicative_homomorphism() {
        let base = RnsBase::new(vec![11, 13, 17, 19]).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);

        for _ in 0..100 {
            let x: i64 = rng.gen_range(0..1000);
            let y: i64 = rng.gen_range(0..1000);
            assert!(((x + y) as u128) < base.product());
            assert!(((x * y) as u128) < base.product());

            let rx = encode(x, &base).unwrap();
            let ry = encode(y, &base).unwrap();

            let sums: Vec<u64> = base
                .moduli()
                .iter()
                .zip(rx.iter().zip(&ry))
                .map(|(&m, (&a, &b))| (a + b) % m)
                .collect();
            let prods: Vec<u64> = base
                .moduli()
                .iter()
                .zip(rx.iter().zip(&ry))
                .map(|(&m, (&a, &b))| (a * b) % m)
                .collect();

            assert_eq!(decode(&base, &sums).unwrap(), (x + y) as u128);
            assert_eq!(decode(&base, &prods).unwrap(), (x * y) as u128);
        }
    }

    #[test]
    fn test_rebase_folds_into_domain() {
        let base = RnsBase::new(vec![3, 5, 7]).unwrap();
        let mut values = vec![10, 12, -2];
        rebase(&mut values, &base);
        assert_eq!(values, vec![1, 2, 5]);
    }

    #[test]
    fn test_brute_force_oracle_agreement() {
        let base = RnsBase::new(vec![2, 3, 5, 7]).unwrap();
        for x in [0i64, 1, 28, 13, 41, 123, 209] {
            let residues = encode(x, &base).unwrap();
            assert_eq!(
                decode(&base, &residues).unwrap(),
                brute_force_decode(&base, &residues)
            );
        }
    }
}
