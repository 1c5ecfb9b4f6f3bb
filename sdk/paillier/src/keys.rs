//! Key Material
//!
//! Wrappers around the `libpaillier` keys. The generator is fixed to
//! `g = n + 1`, so a public key is fully described by its modulus `n` and a
//! private key by the factors `p`, `q`; those are also the serialized forms.

use std::fmt;

use libpaillier::unknown_order::BigNumber;
use libpaillier::{DecryptionKey, EncryptionKey};
use num_bigint::BigUint;
use num_traits::One;
use rand::{CryptoRng, RngCore};
use ringhe_protocol::CryptoError;
use serde::{Deserialize, Serialize};

use crate::{from_number, parse_decimal, to_number};

/// Modulus size used when the caller does not choose one
pub const DEFAULT_KEY_BITS: u64 = 2048;

/// Smallest modulus accepted by [`generate_keypair`]
pub const MIN_KEY_BITS: u64 = 256;

/// Short identity of a public key: blake3 of the big-endian modulus.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyFingerprint([u8; 32]);

impl KeyFingerprint {
    fn of_modulus(n: &BigUint) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("ringhe-paillier-public-key-v1");
        hasher.update(&n.to_bytes_be());
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyFingerprint({})", self)
    }
}

// ============================================================================
// Public Key
// ============================================================================

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PublicKeyRecord {
    /// Decimal modulus
    n: String,
}

/// Paillier public key
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "PublicKeyRecord", into = "PublicKeyRecord")]
pub struct PublicKey {
    n: BigUint,
    /// Largest positive plaintext; values above `n - max_int` encode negatives
    max_int: BigUint,
    fingerprint: KeyFingerprint,
    inner: EncryptionKey,
}

impl PublicKey {
    /// Build a public key from its modulus.
    pub fn from_modulus(n: BigUint) -> Result<Self, CryptoError> {
        if n.bits() < 64 {
            return Err(CryptoError::InvalidKey(format!(
                "modulus too small ({} bits)",
                n.bits()
            )));
        }
        if !n.bit(0) {
            return Err(CryptoError::InvalidKey("modulus must be odd".into()));
        }

        let inner = EncryptionKey::from_bytes(n.to_bytes_be()).map_err(CryptoError::InvalidKey)?;
        let max_int = &n / 3u32;
        let fingerprint = KeyFingerprint::of_modulus(&n);
        Ok(Self {
            n,
            max_int,
            fingerprint,
            inner,
        })
    }

    /// Parse a public key from its decimal modulus.
    pub fn from_decimal(n: &str) -> Result<Self, CryptoError> {
        let n = parse_decimal(n)
            .ok_or_else(|| CryptoError::InvalidKey("modulus is not a decimal integer".into()))?;
        Self::from_modulus(n)
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    pub fn max_int(&self) -> &BigUint {
        &self.max_int
    }

    pub fn fingerprint(&self) -> KeyFingerprint {
        self.fingerprint
    }

    /// Modulus size in bits
    pub fn bits(&self) -> u64 {
        self.n.bits()
    }

    pub fn to_decimal(&self) -> String {
        self.n.to_str_radix(10)
    }

    pub(crate) fn inner(&self) -> &EncryptionKey {
        &self.inner
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.n == other.n
    }
}

impl Eq for PublicKey {}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &self.bits())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl TryFrom<PublicKeyRecord> for PublicKey {
    type Error = CryptoError;

    fn try_from(record: PublicKeyRecord) -> Result<Self, Self::Error> {
        Self::from_decimal(&record.n)
    }
}

impl From<PublicKey> for PublicKeyRecord {
    fn from(key: PublicKey) -> Self {
        Self {
            n: key.to_decimal(),
        }
    }
}

// ============================================================================
// Private Key
// ============================================================================

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PrivateKeyRecord {
    p: String,
    q: String,
}

/// Paillier private key.
/// NEVER log or transmit this struct's internals.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "PrivateKeyRecord", into = "PrivateKeyRecord")]
pub struct PrivateKey {
    public: PublicKey,
    p: BigUint,
    q: BigUint,
    inner: DecryptionKey,
}

impl PrivateKey {
    /// Reconstruct a private key from its prime factors.
    pub fn from_factors(p: BigUint, q: BigUint) -> Result<Self, CryptoError> {
        if p == q {
            return Err(CryptoError::InvalidKey("factors must be distinct".into()));
        }
        if p <= BigUint::one() || q <= BigUint::one() {
            return Err(CryptoError::InvalidKey("factors must exceed 1".into()));
        }

        let inner = DecryptionKey::with_primes(&to_number(&p), &to_number(&q))
            .ok_or_else(|| CryptoError::InvalidKey("factors do not form a Paillier key".into()))?;
        Self::assemble(p, q, inner)
    }

    fn assemble(p: BigUint, q: BigUint, inner: DecryptionKey) -> Result<Self, CryptoError> {
        let public = PublicKey::from_modulus(from_number(inner.n()))?;
        Ok(Self {
            public,
            p,
            q,
            inner,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn p(&self) -> &BigUint {
        &self.p
    }

    pub fn q(&self) -> &BigUint {
        &self.q
    }

    pub(crate) fn inner(&self) -> &DecryptionKey {
        &self.inner
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl TryFrom<PrivateKeyRecord> for PrivateKey {
    type Error = CryptoError;

    fn try_from(record: PrivateKeyRecord) -> Result<Self, Self::Error> {
        let p = parse_decimal(&record.p)
            .ok_or_else(|| CryptoError::InvalidKey("p is not a decimal integer".into()))?;
        let q = parse_decimal(&record.q)
            .ok_or_else(|| CryptoError::InvalidKey("q is not a decimal integer".into()))?;
        Self::from_factors(p, q)
    }
}

impl From<PrivateKey> for PrivateKeyRecord {
    fn from(key: PrivateKey) -> Self {
        Self {
            p: key.p.to_str_radix(10),
            q: key.q.to_str_radix(10),
        }
    }
}

/// A matching public/private key pair
#[derive(Clone, Debug)]
pub struct Keypair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl Keypair {
    pub fn from_private(private: PrivateKey) -> Self {
        Self {
            public: private.public_key().clone(),
            private,
        }
    }
}

/// Generate a fresh keypair with a `bits`-bit modulus using the OS RNG.
///
/// Blocks for a noticeable time at 2048 bits and above.
pub fn generate_keypair(bits: u64) -> Result<Keypair, CryptoError> {
    generate_keypair_with_rng(bits, &mut rand::rngs::OsRng)
}

/// Generate a fresh keypair, drawing both primes from `rng`.
pub fn generate_keypair_with_rng<R: RngCore + CryptoRng>(
    bits: u64,
    rng: &mut R,
) -> Result<Keypair, CryptoError> {
    if bits < MIN_KEY_BITS || bits % 2 != 0 {
        return Err(CryptoError::InvalidKey(format!(
            "modulus size must be even and at least {} bits, got {}",
            MIN_KEY_BITS, bits
        )));
    }
    let half = usize::try_from(bits / 2)
        .map_err(|_| CryptoError::InvalidKey(format!("modulus size {} too large", bits)))?;

    loop {
        let p = BigNumber::prime_from_rng(half, &mut *rng);
        let q = BigNumber::prime_from_rng(half, &mut *rng);
        // None when p == q or λ has no inverse mod n; draw again
        let Some(inner) = DecryptionKey::with_primes_unchecked(&p, &q) else {
            continue;
        };
        let private = PrivateKey::assemble(from_number(&p), from_number(&q), inner)?;
        return Ok(Keypair::from_private(private));
    }
}
