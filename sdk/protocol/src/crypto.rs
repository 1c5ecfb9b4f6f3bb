//! Cryptosystem Seam
//!
//! The ring needs an additively homomorphic public-key scheme and nothing
//! else. Any scheme satisfying
//!
//! ```text
//!   decrypt(sk, add(pk, encrypt(pk, a), encrypt(pk, b))) == a + b
//! ```
//!
//! for signed 64-bit plaintexts (as long as the sum stays in range) can carry
//! the accumulator. The node state machine, key store and wire codec are
//! written against this trait only.

use std::fmt::Debug;

use rand::{CryptoRng, RngCore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failures of a cryptosystem operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("ciphertexts were encrypted under different public keys")]
    KeyMismatch,

    #[error("ciphertext was not produced under this keypair")]
    DecryptionMismatch,

    #[error("plaintext does not fit a signed 64-bit integer")]
    PlaintextOutOfRange,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),
}

/// Additively homomorphic public-key encryption over signed 64-bit integers.
///
/// Key types serialize to the records stored on disk and carried on the wire.
/// Ciphertexts travel as strings via [`Cryptosystem::encode_ciphertext`] since
/// decoding one needs the public key it belongs to.
pub trait Cryptosystem {
    type PublicKey: Clone + PartialEq + Debug + Serialize + DeserializeOwned;
    type PrivateKey: Serialize + DeserializeOwned;
    type Keypair: Clone;
    type Ciphertext: Clone + PartialEq + Debug;

    /// Fresh keypair with a `bits`-bit modulus (or the scheme's equivalent).
    fn generate_keypair<R: RngCore + CryptoRng>(
        &self,
        bits: u64,
        rng: &mut R,
    ) -> Result<Self::Keypair, CryptoError>;

    fn public_key<'a>(&self, keypair: &'a Self::Keypair) -> &'a Self::PublicKey;

    fn private_key<'a>(&self, keypair: &'a Self::Keypair) -> &'a Self::PrivateKey;

    fn keypair_from_private(&self, private: Self::PrivateKey) -> Self::Keypair;

    /// Stable 32-byte identity of a public key.
    fn fingerprint(&self, public: &Self::PublicKey) -> [u8; 32];

    /// Probabilistic encryption; all randomness comes from `rng`.
    fn encrypt<R: RngCore + CryptoRng>(
        &self,
        public: &Self::PublicKey,
        plaintext: i64,
        rng: &mut R,
    ) -> Result<Self::Ciphertext, CryptoError>;

    /// Fails with [`CryptoError::KeyMismatch`] unless both inputs are under `public`.
    fn add(
        &self,
        public: &Self::PublicKey,
        a: &Self::Ciphertext,
        b: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, CryptoError>;

    /// Fails with [`CryptoError::DecryptionMismatch`] for a ciphertext under another key.
    fn decrypt(
        &self,
        keypair: &Self::Keypair,
        ciphertext: &Self::Ciphertext,
    ) -> Result<i64, CryptoError>;

    fn encode_ciphertext(&self, ciphertext: &Self::Ciphertext) -> String;

    fn decode_ciphertext(
        &self,
        public: &Self::PublicKey,
        encoded: &str,
    ) -> Result<Self::Ciphertext, CryptoError>;
}
