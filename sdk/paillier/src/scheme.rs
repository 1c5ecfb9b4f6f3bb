//! [`Cryptosystem`] implementation.

use rand::{CryptoRng, RngCore};
use ringhe_protocol::{CryptoError, Cryptosystem};

use crate::cipher::Ciphertext;
use crate::keys::{Keypair, PrivateKey, PublicKey, generate_keypair_with_rng};

/// Paillier with `g = n + 1` and signed 64-bit plaintexts.
///
/// Ciphertexts are carried as decimal strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Paillier;

impl Cryptosystem for Paillier {
    type PublicKey = PublicKey;
    type PrivateKey = PrivateKey;
    type Keypair = Keypair;
    type Ciphertext = Ciphertext;

    fn generate_keypair<R: RngCore + CryptoRng>(
        &self,
        bits: u64,
        rng: &mut R,
    ) -> Result<Keypair, CryptoError> {
        generate_keypair_with_rng(bits, rng)
    }

    fn public_key<'a>(&self, keypair: &'a Keypair) -> &'a PublicKey {
        &keypair.public
    }

    fn private_key<'a>(&self, keypair: &'a Keypair) -> &'a PrivateKey {
        &keypair.private
    }

    fn keypair_from_private(&self, private: PrivateKey) -> Keypair {
        Keypair::from_private(private)
    }

    fn fingerprint(&self, public: &PublicKey) -> [u8; 32] {
        *public.fingerprint().as_bytes()
    }

    fn encrypt<R: RngCore + CryptoRng>(
        &self,
        public: &PublicKey,
        plaintext: i64,
        rng: &mut R,
    ) -> Result<Ciphertext, CryptoError> {
        public.encrypt_with_rng(plaintext, rng)
    }

    fn add(
        &self,
        public: &PublicKey,
        a: &Ciphertext,
        b: &Ciphertext,
    ) -> Result<Ciphertext, CryptoError> {
        public.add(a, b)
    }

    fn decrypt(&self, keypair: &Keypair, ciphertext: &Ciphertext) -> Result<i64, CryptoError> {
        keypair.private.decrypt(ciphertext)
    }

    fn encode_ciphertext(&self, ciphertext: &Ciphertext) -> String {
        ciphertext.to_decimal()
    }

    fn decode_ciphertext(
        &self,
        public: &PublicKey,
        encoded: &str,
    ) -> Result<Ciphertext, CryptoError> {
        Ciphertext::from_decimal(encoded, public)
    }
}
