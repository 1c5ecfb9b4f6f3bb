//! Encryption, decryption and homomorphic addition.
//!
//! The group arithmetic is `libpaillier`'s; this module maps signed
//! plaintexts into `Z_n` and keeps every ciphertext tied to its key.

use std::fmt;

use libpaillier::unknown_order::BigNumber;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{ToPrimitive, Zero};
use rand::{CryptoRng, RngCore};
use ringhe_protocol::CryptoError;

use crate::keys::{KeyFingerprint, PrivateKey, PublicKey};
use crate::{from_number, to_number};

/// A ciphertext bound to the public key it was produced under.
#[derive(Clone, PartialEq, Eq)]
pub struct Ciphertext {
    value: BigUint,
    key: KeyFingerprint,
}

impl Ciphertext {
    /// Bind a raw value to `public`, checking that it is a unit of Z*_{n²}.
    pub fn from_value(value: BigUint, public: &PublicKey) -> Result<Self, CryptoError> {
        let n = public.n();
        if value.is_zero() || value >= n * n {
            return Err(CryptoError::InvalidCiphertext(
                "value outside [1, n²)".into(),
            ));
        }
        if (&value % n).modinv(n).is_none() {
            return Err(CryptoError::InvalidCiphertext(
                "value shares a factor with n".into(),
            ));
        }
        Ok(Self {
            value,
            key: public.fingerprint(),
        })
    }

    /// Parse a decimal ciphertext and bind it to `public`.
    pub fn from_decimal(s: &str, public: &PublicKey) -> Result<Self, CryptoError> {
        let value = crate::parse_decimal(s).ok_or_else(|| {
            CryptoError::InvalidCiphertext("ciphertext is not a decimal integer".into())
        })?;
        Self::from_value(value, public)
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// Fingerprint of the public key this ciphertext belongs to
    pub fn fingerprint(&self) -> KeyFingerprint {
        self.key
    }

    pub fn to_decimal(&self) -> String {
        self.value.to_str_radix(10)
    }

    /// Short digest for log lines; never reveals the full value.
    pub fn digest(&self) -> String {
        let hash = blake3::hash(&self.value.to_bytes_be());
        hex::encode(&hash.as_bytes()[..6])
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ciphertext({} under {})", self.digest(), self.key)
    }
}

impl PublicKey {
    /// Map a signed plaintext into Z_n. Negatives live in the top third.
    fn encode(&self, plaintext: i64) -> BigUint {
        let magnitude = BigUint::from(plaintext.unsigned_abs());
        if plaintext >= 0 {
            magnitude
        } else {
            self.n() - magnitude
        }
    }

    /// Probabilistic encryption using the OS RNG.
    pub fn encrypt(&self, plaintext: i64) -> Result<Ciphertext, CryptoError> {
        self.encrypt_with_rng(plaintext, &mut rand::rngs::OsRng)
    }

    /// Probabilistic encryption drawing every nonce from `rng`.
    ///
    /// Given the same RNG state the output is identical, which callers use to
    /// make retried steps reproduce the same ciphertext.
    pub fn encrypt_with_rng<R: RngCore + CryptoRng>(
        &self,
        plaintext: i64,
        rng: &mut R,
    ) -> Result<Ciphertext, CryptoError> {
        let m = self.encode(plaintext);
        if !m.is_zero() {
            return self.encrypt_encoded(&m, rng);
        }
        // libpaillier only encrypts messages in [1, n): Enc(1) ⊕ Enc(n - 1)
        let one = self.encrypt_encoded(&BigUint::from(1u32), rng)?;
        let minus_one = self.encrypt_encoded(&(self.n() - 1u32), rng)?;
        self.add(&one, &minus_one)
    }

    /// Encrypt an already encoded message `m` in [1, n).
    pub(crate) fn encrypt_encoded<R: RngCore + CryptoRng>(
        &self,
        m: &BigUint,
        rng: &mut R,
    ) -> Result<Ciphertext, CryptoError> {
        let n = self.inner().n();
        let nonce = loop {
            let r = BigNumber::from_rng(n, &mut *rng);
            if !r.is_zero() && r.gcd(n) == BigNumber::one() {
                break r;
            }
        };
        let (value, _) = self
            .inner()
            .encrypt(m.to_bytes_be(), Some(nonce))
            .ok_or(CryptoError::PlaintextOutOfRange)?;
        Ok(Ciphertext {
            value: from_number(&value),
            key: self.fingerprint(),
        })
    }

    /// Homomorphic addition: the result decrypts to the sum of the inputs.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, CryptoError> {
        let fingerprint = self.fingerprint();
        if a.key != fingerprint || b.key != fingerprint {
            return Err(CryptoError::KeyMismatch);
        }
        let sum = self
            .inner()
            .add(&to_number(&a.value), &to_number(&b.value))
            .ok_or_else(|| CryptoError::InvalidCiphertext("operand outside [1, n²)".into()))?;
        Ok(Ciphertext {
            value: from_number(&sum),
            key: fingerprint,
        })
    }
}

impl PrivateKey {
    /// Decrypt to a signed 64-bit plaintext.
    pub fn decrypt(&self, ciphertext: &Ciphertext) -> Result<i64, CryptoError> {
        let public = self.public_key();
        if ciphertext.key != public.fingerprint() {
            return Err(CryptoError::DecryptionMismatch);
        }
        let m = self
            .inner()
            .decrypt(&to_number(&ciphertext.value))
            .ok_or(CryptoError::DecryptionMismatch)?;

        self.decode(BigUint::from_bytes_be(&m))?
            .to_i64()
            .ok_or(CryptoError::PlaintextOutOfRange)
    }

    fn decode(&self, m: BigUint) -> Result<BigInt, CryptoError> {
        let public = self.public_key();
        let n = public.n();
        let max_int = public.max_int();

        if &m <= max_int {
            Ok(BigInt::from_biguint(Sign::Plus, m))
        } else if m >= n - max_int {
            Ok(BigInt::from_biguint(Sign::Minus, n - m))
        } else {
            Err(CryptoError::PlaintextOutOfRange)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{Keypair, MIN_KEY_BITS, generate_keypair};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn keypair() -> Keypair {
        generate_keypair(MIN_KEY_BITS).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt() {
        let kp = keypair();
        for value in [0i64, 1, 42, -1, -9_999, i64::MAX, i64::MIN + 1, i64::MIN] {
            let c = kp.public.encrypt(value).unwrap();
            assert_eq!(kp.private.decrypt(&c).unwrap(), value);
        }
    }

    #[test]
    fn test_homomorphic_add() {
        let kp = keypair();
        let a = kp.public.encrypt(3).unwrap();
        let b = kp.public.encrypt(4).unwrap();
        let c = kp.public.encrypt(5).unwrap();

        let ab = kp.public.add(&a, &b).unwrap();
        let abc = kp.public.add(&ab, &c).unwrap();
        assert_eq!(kp.private.decrypt(&abc).unwrap(), 12);

        // commutative and associative
        let cb = kp.public.add(&c, &b).unwrap();
        let cba = kp.public.add(&cb, &a).unwrap();
        assert_eq!(abc, cba);
    }

    #[test]
    fn test_add_with_negative_values() {
        let kp = keypair();
        let a = kp.public.encrypt(10).unwrap();
        let b = kp.public.encrypt(-25).unwrap();
        let sum = kp.public.add(&a, &b).unwrap();
        assert_eq!(kp.private.decrypt(&sum).unwrap(), -15);

        let zero = kp.public.encrypt(0).unwrap();
        let back = kp.public.add(&sum, &zero).unwrap();
        assert_eq!(kp.private.decrypt(&back).unwrap(), -15);
    }

    #[test]
    fn test_encryption_is_probabilistic() {
        let kp = keypair();
        let first = kp.public.encrypt(5).unwrap();
        let second = kp.public.encrypt(5).unwrap();
        assert_ne!(first.value(), second.value());
        assert_eq!(kp.private.decrypt(&first).unwrap(), 5);
        assert_eq!(kp.private.decrypt(&second).unwrap(), 5);
    }

    #[test]
    fn test_seeded_encryption_is_reproducible() {
        let kp = keypair();
        for value in [7i64, 0, -3] {
            let first = kp
                .public
                .encrypt_with_rng(value, &mut StdRng::from_seed([9u8; 32]))
                .unwrap();
            let second = kp
                .public
                .encrypt_with_rng(value, &mut StdRng::from_seed([9u8; 32]))
                .unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_add_across_keys_fails() {
        let kp1 = keypair();
        let kp2 = keypair();
        let a = kp1.public.encrypt(1).unwrap();
        let b = kp2.public.encrypt(2).unwrap();
        assert_eq!(kp1.public.add(&a, &b), Err(CryptoError::KeyMismatch));
        assert_eq!(kp2.public.add(&a, &b), Err(CryptoError::KeyMismatch));
    }

    #[test]
    fn test_decrypt_with_foreign_key_fails() {
        let kp1 = keypair();
        let kp2 = keypair();
        let c = kp1.public.encrypt(1).unwrap();
        assert_eq!(
            kp2.private.decrypt(&c),
            Err(CryptoError::DecryptionMismatch)
        );
    }

    #[test]
    fn test_foreign_accumulator_is_not_meaningful() {
        // Rebinding the raw value to another key and decrypting does not
        // recover the plaintext.
        let kp1 = keypair();
        let kp2 = keypair();
        let c = kp1.public.encrypt(1234).unwrap();
        let n2 = kp2.public.n() * kp2.public.n();
        let rebound = Ciphertext::from_value(c.value() % n2, &kp2.public);
        if let Ok(rebound) = rebound {
            assert_ne!(kp2.private.decrypt(&rebound), Ok(1234));
        }
    }

    #[test]
    fn test_from_decimal_validates_range() {
        let kp = keypair();
        let c = kp.public.encrypt(17).unwrap();
        let parsed = Ciphertext::from_decimal(&c.to_decimal(), &kp.public).unwrap();
        assert_eq!(parsed, c);

        let n = kp.public.n();
        assert!(Ciphertext::from_decimal("0", &kp.public).is_err());
        assert!(Ciphertext::from_decimal(&(n * n).to_str_radix(10), &kp.public).is_err());
        assert!(Ciphertext::from_decimal(&n.to_str_radix(10), &kp.public).is_err());
        assert!(Ciphertext::from_decimal("12ab", &kp.public).is_err());
    }

    #[test]
    fn test_overflow_band_is_rejected() {
        let kp = keypair();
        // n/2 encodes neither a positive nor a negative value
        let middle = kp.public.n() / 2u32;
        let c = kp
            .public
            .encrypt_encoded(&middle, &mut StdRng::from_seed([1u8; 32]))
            .unwrap();
        assert_eq!(
            kp.private.decrypt(&c),
            Err(CryptoError::PlaintextOutOfRange)
        );
    }
}
