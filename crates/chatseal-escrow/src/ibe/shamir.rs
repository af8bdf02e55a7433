//! Shamir secret sharing over GF(2^8).
//!
//! Each byte of the secret is the constant term of an independent random
//! polynomial of degree `threshold - 1`; share `x` holds the evaluations at
//! `x`. Any `threshold` shares recover the secret by Lagrange interpolation
//! at zero; fewer reveal nothing.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::IbeError;

/// One share: a non-zero evaluation point and the evaluations.
#[derive(Clone, PartialEq, Eq)]
pub struct Share {
    pub x: u8,
    pub y: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Share(x={}, {} bytes)", self.x, self.y.len())
    }
}

/// Multiply in GF(2^8) with the AES reduction polynomial.
fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut product = 0u8;
    for _ in 0..8 {
        // Branch-free select keeps timing independent of the operands.
        product ^= a & 0u8.wrapping_sub(b & 1);
        let carry = 0u8.wrapping_sub(a >> 7);
        a = (a << 1) ^ (0x1b & carry);
        b >>= 1;
    }
    product
}

/// Multiplicative inverse, `a^254`. Zero maps to zero.
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

/// Split `secret` into `shares` shares, any `threshold` of which recover it.
pub fn split(secret: &[u8], threshold: u8, shares: u8) -> Result<Vec<Share>, IbeError> {
    if threshold == 0 || threshold > shares {
        return Err(IbeError::InvalidThreshold {
            threshold,
            servers: shares as usize,
        });
    }

    let mut out: Vec<Share> = (1..=shares)
        .map(|x| Share {
            x,
            y: Zeroizing::new(Vec::with_capacity(secret.len())),
        })
        .collect();

    let mut coefficients = Zeroizing::new(vec![0u8; threshold as usize]);
    for &byte in secret {
        coefficients[0] = byte;
        OsRng.fill_bytes(&mut coefficients[1..]);

        for share in out.iter_mut() {
            // Horner evaluation from the highest coefficient down.
            let mut acc = 0u8;
            for &c in coefficients.iter().rev() {
                acc = gf_mul(acc, share.x) ^ c;
            }
            share.y.push(acc);
        }
    }
    coefficients.zeroize();

    Ok(out)
}

/// Recover the secret from distinct shares.
///
/// The caller supplies at least `threshold` shares; with fewer the output is
/// unrelated to the secret.
pub fn combine(shares: &[Share]) -> Result<Zeroizing<Vec<u8>>, IbeError> {
    let first = shares
        .first()
        .ok_or_else(|| IbeError::Malformed("no shares to combine".into()))?;
    let len = first.y.len();

    for (i, share) in shares.iter().enumerate() {
        if share.x == 0 {
            return Err(IbeError::Malformed("share at x = 0".into()));
        }
        if share.y.len() != len {
            return Err(IbeError::Malformed("shares differ in length".into()));
        }
        if shares[..i].iter().any(|other| other.x == share.x) {
            return Err(IbeError::Malformed(format!("duplicate share x = {}", share.x)));
        }
    }

    // Lagrange basis at zero: l_i = prod_{j != i} x_j / (x_j - x_i).
    let basis: Vec<u8> = shares
        .iter()
        .map(|si| {
            shares
                .iter()
                .filter(|sj| sj.x != si.x)
                .fold(1u8, |acc, sj| gf_mul(acc, gf_mul(sj.x, gf_inv(sj.x ^ si.x))))
        })
        .collect();

    let mut secret = Zeroizing::new(vec![0u8; len]);
    for (share, &l) in shares.iter().zip(&basis) {
        for (out, &y) in secret.iter_mut().zip(share.y.iter()) {
            *out ^= gf_mul(y, l);
        }
    }
    Ok(secret)
}
