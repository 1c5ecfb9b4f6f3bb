//! Ringhe Paillier
//!
//! Adapter from [`libpaillier`] to the ring's [`Cryptosystem`] seam.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  libpaillier      keygen from primes · encrypt · add · decrypt│
//! │  ─────────────────────────────────────────────────────────────│
//! │  this crate       i64 ⇄ Z_n   (negatives in the top third)    │
//! │                   ciphertext ↔ key fingerprint binding        │
//! │                   nonces drawn from a caller-supplied RNG     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every [`Ciphertext`] is bound to the [`KeyFingerprint`] of the public key
//! it was produced under, so combining ciphertexts from different keys fails
//! closed with [`CryptoError::KeyMismatch`] instead of yielding garbage.

pub mod cipher;
pub mod keys;
pub mod scheme;

pub use cipher::Ciphertext;
pub use keys::{
    DEFAULT_KEY_BITS, KeyFingerprint, Keypair, MIN_KEY_BITS, PrivateKey, PublicKey,
    generate_keypair, generate_keypair_with_rng,
};
pub use ringhe_protocol::{CryptoError, Cryptosystem};
pub use scheme::Paillier;

use libpaillier::unknown_order::BigNumber;
use num_bigint::BigUint;

/// Parse a base-10 string into a `BigUint`.
///
/// Only ASCII digits are accepted; signs, separators and whitespace are not.
pub fn parse_decimal(s: &str) -> Option<BigUint> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigUint::parse_bytes(s.as_bytes(), 10)
}

pub(crate) fn to_number(value: &BigUint) -> BigNumber {
    BigNumber::from_slice(value.to_bytes_be())
}

pub(crate) fn from_number(value: &BigNumber) -> BigUint {
    BigUint::from_bytes_be(&value.to_bytes())
}
