//! Message Codec
//!
//! JSON wire format of the message passed along the ring. This is the sole
//! content of a participant's inbox file.
//!
//! ```json
//! {
//!   "version": 1,
//!   "round": "default",
//!   "participants": ["a@x.org", "b@x.org"],
//!   "public_key": { "n": "<decimal>" },
//!   "accumulator": "<decimal>"
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{CryptoError, Cryptosystem};
use crate::topology::{Ring, TopologyError};

/// Current wire format version
pub const WIRE_VERSION: u32 = 1;

const DEFAULT_ROUND: &str = "default";

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// Also covers a public key the cryptosystem refuses to parse
    #[error("message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported message version {0}")]
    UnsupportedVersion(u32),

    #[error(transparent)]
    Ring(#[from] TopologyError),

    #[error("bad accumulator: {0}")]
    Accumulator(CryptoError),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RingMessageWire<P> {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default = "default_round")]
    round: String,
    participants: Vec<String>,
    public_key: P,
    #[serde(alias = "data")]
    accumulator: String,
}

fn default_version() -> u32 {
    WIRE_VERSION
}

fn default_round() -> String {
    DEFAULT_ROUND.into()
}

/// The unit moved along the ring.
///
/// `accumulator` encrypts, under `public_key`, the sum of the secrets of every
/// participant the message has passed through in the current traversal.
pub struct RingMessage<C: Cryptosystem> {
    pub round: String,
    pub participants: Ring,
    pub public_key: C::PublicKey,
    pub accumulator: C::Ciphertext,
}

impl<C: Cryptosystem> RingMessage<C> {
    pub fn new(
        round: impl Into<String>,
        participants: Ring,
        public_key: C::PublicKey,
        accumulator: C::Ciphertext,
    ) -> Self {
        Self {
            round: round.into(),
            participants,
            public_key,
            accumulator,
        }
    }

    /// Same round, ring and key with a new accumulator.
    pub fn with_accumulator(&self, accumulator: C::Ciphertext) -> Self {
        Self {
            round: self.round.clone(),
            participants: self.participants.clone(),
            public_key: self.public_key.clone(),
            accumulator,
        }
    }

    /// Serialize to the wire format. Output is deterministic for equal messages.
    pub fn encode(&self, crypto: &C) -> Result<Vec<u8>, CodecError> {
        let wire = RingMessageWire {
            version: WIRE_VERSION,
            round: self.round.clone(),
            participants: self.participants.participants().to_vec(),
            public_key: &self.public_key,
            accumulator: crypto.encode_ciphertext(&self.accumulator),
        };
        Ok(serde_json::to_vec_pretty(&wire)?)
    }

    /// Parse and validate a wire message.
    ///
    /// Fails on unknown versions, malformed rings, and accumulators that are
    /// not valid ciphertexts under the carried public key.
    pub fn decode(crypto: &C, bytes: &[u8]) -> Result<Self, CodecError> {
        let wire: RingMessageWire<C::PublicKey> = serde_json::from_slice(bytes)?;
        if wire.version != WIRE_VERSION {
            return Err(CodecError::UnsupportedVersion(wire.version));
        }

        let participants = Ring::new(wire.participants)?;
        let accumulator = crypto
            .decode_ciphertext(&wire.public_key, &wire.accumulator)
            .map_err(CodecError::Accumulator)?;

        Ok(Self {
            round: wire.round,
            participants,
            public_key: wire.public_key,
            accumulator,
        })
    }
}

impl<C: Cryptosystem> Clone for RingMessage<C> {
    fn clone(&self) -> Self {
        self.with_accumulator(self.accumulator.clone())
    }
}

impl<C: Cryptosystem> PartialEq for RingMessage<C> {
    fn eq(&self, other: &Self) -> bool {
        self.round == other.round
            && self.participants == other.participants
            && self.public_key == other.public_key
            && self.accumulator == other.accumulator
    }
}

impl<C: Cryptosystem> fmt::Debug for RingMessage<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingMessage")
            .field("round", &self.round)
            .field("participants", &self.participants)
            .field("public_key", &self.public_key)
            .field("accumulator", &self.accumulator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{CryptoRng, RngCore};

    /// Unblinded integers tagged with a key name; enough to drive the codec.
    #[derive(Debug, Clone, Copy, Default)]
    struct Tagged;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct TagKey {
        n: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TagCipher {
        key: String,
        value: i64,
    }

    impl Cryptosystem for Tagged {
        type PublicKey = TagKey;
        type PrivateKey = TagKey;
        type Keypair = TagKey;
        type Ciphertext = TagCipher;

        fn generate_keypair<R: RngCore + CryptoRng>(
            &self,
            _bits: u64,
            rng: &mut R,
        ) -> Result<TagKey, CryptoError> {
            Ok(TagKey {
                n: rng.next_u64().to_string(),
            })
        }

        fn public_key<'a>(&self, keypair: &'a TagKey) -> &'a TagKey {
            keypair
        }

        fn private_key<'a>(&self, keypair: &'a TagKey) -> &'a TagKey {
            keypair
        }

        fn keypair_from_private(&self, private: TagKey) -> TagKey {
            private
        }

        fn fingerprint(&self, public: &TagKey) -> [u8; 32] {
            let mut out = [0u8; 32];
            let bytes = public.n.as_bytes();
            let len = bytes.len().min(32);
            out[..len].copy_from_slice(&bytes[..len]);
            out
        }

        fn encrypt<R: RngCore + CryptoRng>(
            &self,
            public: &TagKey,
            plaintext: i64,
            _rng: &mut R,
        ) -> Result<TagCipher, CryptoError> {
            Ok(TagCipher {
                key: public.n.clone(),
                value: plaintext,
            })
        }

        fn add(&self, public: &TagKey, a: &TagCipher, b: &TagCipher) -> Result<TagCipher, CryptoError> {
            if a.key != public.n || b.key != public.n {
                return Err(CryptoError::KeyMismatch);
            }
            let value = a
                .value
                .checked_add(b.value)
                .ok_or(CryptoError::PlaintextOutOfRange)?;
            Ok(TagCipher {
                key: public.n.clone(),
                value,
            })
        }

        fn decrypt(&self, keypair: &TagKey, ciphertext: &TagCipher) -> Result<i64, CryptoError> {
            if ciphertext.key != keypair.n {
                return Err(CryptoError::DecryptionMismatch);
            }
            Ok(ciphertext.value)
        }

        fn encode_ciphertext(&self, ciphertext: &TagCipher) -> String {
            ciphertext.value.to_string()
        }

        fn decode_ciphertext(&self, public: &TagKey, encoded: &str) -> Result<TagCipher, CryptoError> {
            let value = encoded
                .parse()
                .map_err(|_| CryptoError::InvalidCiphertext(encoded.to_string()))?;
            Ok(TagCipher {
                key: public.n.clone(),
                value,
            })
        }
    }

    fn key() -> TagKey {
        TagKey { n: "77".into() }
    }

    fn ring() -> Ring {
        Ring::new(vec!["a".into(), "b".into(), "c".into()]).unwrap()
    }

    fn message() -> RingMessage<Tagged> {
        let key = key();
        let accumulator = Tagged.encrypt(&key, 3, &mut rand::thread_rng()).unwrap();
        RingMessage::new("r1", ring(), key, accumulator)
    }

    #[test]
    fn test_encode_decode() {
        let msg = message();

        let bytes = msg.encode(&Tagged).unwrap();
        let decoded = RingMessage::decode(&Tagged, &bytes).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(Tagged.decrypt(&key(), &decoded.accumulator).unwrap(), 3);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let msg = message();
        assert_eq!(msg.encode(&Tagged).unwrap(), msg.clone().encode(&Tagged).unwrap());
    }

    #[test]
    fn test_with_accumulator_keeps_round_and_ring() {
        let msg = message();
        let next = msg.with_accumulator(TagCipher {
            key: "77".into(),
            value: 10,
        });
        assert_eq!(next.round, msg.round);
        assert_eq!(next.participants, msg.participants);
        assert_eq!(next.public_key, msg.public_key);
        assert_ne!(next, msg);
    }

    #[test]
    fn test_wire_field_names() {
        let bytes = message().encode(&Tagged).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["version"], 1);
        assert_eq!(value["round"], "r1");
        assert_eq!(value["participants"][0], "a");
        assert_eq!(value["public_key"]["n"], "77");
        assert_eq!(value["accumulator"], "3");
    }

    #[test]
    fn test_decode_accepts_legacy_data_field() {
        let legacy = serde_json::json!({
            "participants": ["a", "b"],
            "public_key": { "n": "77" },
            "data": "9",
        });
        let decoded = RingMessage::decode(&Tagged, legacy.to_string().as_bytes()).unwrap();
        assert_eq!(decoded.round, "default");
        assert_eq!(decoded.accumulator.value, 9);
    }

    #[test]
    fn test_decode_failures() {
        let decode = |value: serde_json::Value| {
            RingMessage::<Tagged>::decode(&Tagged, value.to_string().as_bytes())
        };

        assert!(matches!(
            RingMessage::<Tagged>::decode(&Tagged, b"{ not json"),
            Err(CodecError::Json(_))
        ));

        let missing = serde_json::json!({ "participants": ["a"], "public_key": { "n": "77" } });
        assert!(matches!(decode(missing), Err(CodecError::Json(_))));

        let future = serde_json::json!({
            "version": 2, "participants": ["a"], "public_key": { "n": "77" }, "accumulator": "1",
        });
        assert!(matches!(
            decode(future),
            Err(CodecError::UnsupportedVersion(2))
        ));

        let dup = serde_json::json!({
            "participants": ["a", "a"], "public_key": { "n": "77" }, "accumulator": "1",
        });
        assert!(matches!(
            decode(dup),
            Err(CodecError::Ring(TopologyError::MalformedRing(_)))
        ));

        let bad_key = serde_json::json!({
            "participants": ["a"], "public_key": { "n": "77", "g": "78" }, "accumulator": "1",
        });
        assert!(matches!(decode(bad_key), Err(CodecError::Json(_))));

        let bad_acc = serde_json::json!({
            "participants": ["a"], "public_key": { "n": "77" }, "accumulator": "x",
        });
        assert!(matches!(
            decode(bad_acc),
            Err(CodecError::Accumulator(CryptoError::InvalidCiphertext(_)))
        ));
    }
}
