//! Threshold secret sharing over GF(2^8).
//!
//! Each byte of a 32-byte secret is shared independently with a random
//! polynomial of degree `threshold - 1`. Share `i` (zero-based) is the
//! evaluation at `x = i + 1`, so at most 255 shares exist per secret.

use rand::RngCore;

use crate::error::{PermsError, Result};

/// Largest number of shares a single secret can be split into.
pub const MAX_SHARES: usize = 255;

fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut product = 0u8;
    while b != 0 {
        if b & 1 != 0 {
            product ^= a;
        }
        let carry = a & 0x80;
        a <<= 1;
        if carry != 0 {
            a ^= 0x1b;
        }
        b >>= 1;
    }
    product
}

// a^254 == a^-1 in GF(2^8); callers never pass zero.
fn gf_inv(a: u8) -> u8 {
    let mut result = 1u8;
    let mut base = a;
    let mut exp = 254u8;
    while exp > 0 {
        if exp & 1 == 1 {
            result = gf_mul(result, base);
        }
        base = gf_mul(base, base);
        exp >>= 1;
    }
    result
}

/// Split `secret` into `shares` pieces, any `threshold` of which recover it.
pub fn split<R: RngCore>(
    secret: &[u8; 32],
    threshold: usize,
    shares: usize,
    rng: &mut R,
) -> Result<Vec<[u8; 32]>> {
    if threshold == 0 || threshold > shares || shares > MAX_SHARES {
        return Err(PermsError::EncryptionError(format!(
            "cannot share a secret {} of {}",
            threshold, shares
        )));
    }

    let mut coefficients = vec![[0u8; 32]; threshold - 1];
    for c in coefficients.iter_mut() {
        rng.fill_bytes(c);
    }

    let out = (1..=shares)
        .map(|x| {
            let x = x as u8;
            let mut share = [0u8; 32];
            for (b, byte) in share.iter_mut().enumerate() {
                let mut y = 0u8;
                for c in coefficients.iter().rev() {
                    y = gf_mul(y, x) ^ c[b];
                }
                *byte = gf_mul(y, x) ^ secret[b];
            }
            share
        })
        .collect();

    Ok(out)
}

/// Recover a secret from `(x, share)` points with distinct non-zero `x`.
///
/// Exactly `threshold` points must be supplied; extra points are not checked
/// for consistency.
pub fn combine(points: &[(u8, [u8; 32])]) -> [u8; 32] {
    let mut secret = [0u8; 32];
    for (i, (xi, yi)) in points.iter().enumerate() {
        let mut basis = 1u8;
        for (j, (xj, _)) in points.iter().enumerate() {
            if i != j {
                basis = gf_mul(basis, gf_mul(*xj, gf_inv(*xj ^ *xi)));
            }
        }
        for (s, y) in secret.iter_mut().zip(yi.iter()) {
            *s ^= gf_mul(*y, basis);
        }
    }
    secret
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_field_inverse() {
        for a in 1..=255u8 {
            assert_eq!(gf_mul(a, gf_inv(a)), 1, "inverse of {}", a);
        }
    }

    #[test]
    fn test_one_of_n_shares_are_the_secret() {
        let secret = [7u8; 32];
        let shares = split(&secret, 1, 4, &mut rand::thread_rng()).unwrap();
        assert!(shares.iter().all(|s| *s == secret));
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let mut rng = rand::thread_rng();
        assert!(split(&[0; 32], 0, 3, &mut rng).is_err());
        assert!(split(&[0; 32], 4, 3, &mut rng).is_err());
        assert!(split(&[0; 32], 2, 256, &mut rng).is_err());
    }

    proptest! {
        #[test]
        fn prop_any_threshold_subset_recovers(
            secret in any::<[u8; 32]>(),
            (threshold, n, picks) in (1usize..6)
                .prop_flat_map(|n| (1..=n, Just(n)))
                .prop_flat_map(|(k, n)| (Just(k), Just(n), Just((0..n).collect::<Vec<_>>()).prop_shuffle())),
        ) {
            let shares = split(&secret, threshold, n, &mut rand::thread_rng()).unwrap();
            let points: Vec<(u8, [u8; 32])> = picks
                .iter()
                .take(threshold)
                .map(|&i| ((i + 1) as u8, shares[i]))
                .collect();
            prop_assert_eq!(combine(&points), secret);
        }
    }
}
