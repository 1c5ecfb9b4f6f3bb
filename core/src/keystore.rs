//! Key Store / Result Store
//!
//! Durable, node-private storage for:
//! - the collector's keypair, keyed by round, in the cryptosystem's own
//!   serialized form
//! - per-round markers: genesis written, terminal result
//! - a 32-byte node key that seeds reproducible encryption randomness
//!
//! Writes are durable before the issuing function returns.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info};
use rand::RngCore;
use ringhe_protocol::Cryptosystem;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mailbox::write_atomic;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

const ROUNDS_DIR: &str = "rounds";
const PUBLIC_KEY_FILE: &str = "public_key.json";
const PRIVATE_KEY_FILE: &str = "private_key.json";
const INITIATED_FILE: &str = "initiated";
const TERMINAL_FILE: &str = "terminal.json";
const NODE_KEY_FILE: &str = "node.key";

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("no keypair stored for round {0:?}")]
    NotFound(String),

    #[error("key store I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt key material at {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
}

/// Node-private persistent state.
pub trait KeyStore {
    fn put_keypair<C: Cryptosystem>(
        &self,
        crypto: &C,
        round: &str,
        keypair: &C::Keypair,
    ) -> Result<(), KeyStoreError>;

    /// Fails with [`KeyStoreError::NotFound`] when no keypair exists for `round`.
    fn get_keypair<C: Cryptosystem>(
        &self,
        crypto: &C,
        round: &str,
    ) -> Result<C::Keypair, KeyStoreError>;

    /// Record that the genesis message for `round` was durably written.
    fn mark_initiated(&self, round: &str) -> Result<(), KeyStoreError>;

    fn is_initiated(&self, round: &str) -> Result<bool, KeyStoreError>;

    /// Record the decrypted sum. Overwriting with the same value is harmless.
    fn mark_terminal(&self, round: &str, sum: i64) -> Result<(), KeyStoreError>;

    fn terminal_result(&self, round: &str) -> Result<Option<i64>, KeyStoreError>;

    fn is_terminal(&self, round: &str) -> Result<bool, KeyStoreError> {
        Ok(self.terminal_result(round)?.is_some())
    }

    /// The node key, created on first use.
    fn node_key(&self) -> Result<[u8; 32], KeyStoreError>;
}

// ============================================================================
// On-disk Formats
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct TerminalFile {
    round: String,
    result: i64,
}

// ============================================================================
// Filesystem Key Store
// ============================================================================

/// Key store rooted in the node's private directory.
#[derive(Debug, Clone)]
pub struct FsKeyStore {
    root: PathBuf,
}

impl FsKeyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn round_dir(&self, round: &str) -> PathBuf {
        self.root.join(ROUNDS_DIR).join(round)
    }

    fn write_private(&self, path: &Path, bytes: &[u8]) -> Result<(), KeyStoreError> {
        write_atomic(path, bytes).map_err(|e| io_err(path, e))?;

        #[cfg(unix)]
        {
            // chmod 600 (rw-------)
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms).map_err(|e| io_err(path, e))?;
        }

        Ok(())
    }

    fn read_optional(&self, path: &Path) -> Result<Option<Vec<u8>>, KeyStoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(path, e)),
        }
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, KeyStoreError> {
        let Some(bytes) = self.read_optional(path)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| corrupt(path, e.to_string()))
    }
}

fn io_err(path: &Path, source: io::Error) -> KeyStoreError {
    KeyStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> KeyStoreError {
    KeyStoreError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn to_json<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>, KeyStoreError> {
    serde_json::to_vec_pretty(value).map_err(|e| corrupt(path, e.to_string()))
}

impl KeyStore for FsKeyStore {
    fn put_keypair<C: Cryptosystem>(
        &self,
        crypto: &C,
        round: &str,
        keypair: &C::Keypair,
    ) -> Result<(), KeyStoreError> {
        let dir = self.round_dir(round);

        // Private half first: a public key file alone never looks like a keypair
        let private_path = dir.join(PRIVATE_KEY_FILE);
        let private = to_json(&private_path, crypto.private_key(keypair))?;
        self.write_private(&private_path, &private)?;

        let public_path = dir.join(PUBLIC_KEY_FILE);
        let public = to_json(&public_path, crypto.public_key(keypair))?;
        self.write_private(&public_path, &public)?;

        info!(
            "Stored keypair {:?} for round {:?} in {}",
            crypto.public_key(keypair),
            round,
            dir.display()
        );
        Ok(())
    }

    fn get_keypair<C: Cryptosystem>(
        &self,
        crypto: &C,
        round: &str,
    ) -> Result<C::Keypair, KeyStoreError> {
        let dir = self.round_dir(round);
        let private: C::PrivateKey = self
            .read_json(&dir.join(PRIVATE_KEY_FILE))?
            .ok_or_else(|| KeyStoreError::NotFound(round.to_string()))?;
        let keypair = crypto.keypair_from_private(private);

        // Cross-check the stored public key when present
        let public_path = dir.join(PUBLIC_KEY_FILE);
        if let Some(stored) = self.read_json::<C::PublicKey>(&public_path)? {
            if &stored != crypto.public_key(&keypair) {
                return Err(corrupt(&public_path, "public key does not match factors"));
            }
        }

        Ok(keypair)
    }

    fn mark_initiated(&self, round: &str) -> Result<(), KeyStoreError> {
        let path = self.round_dir(round).join(INITIATED_FILE);
        write_atomic(&path, b"").map_err(|e| io_err(&path, e))
    }

    fn is_initiated(&self, round: &str) -> Result<bool, KeyStoreError> {
        let path = self.round_dir(round).join(INITIATED_FILE);
        path.try_exists().map_err(|e| io_err(&path, e))
    }

    fn mark_terminal(&self, round: &str, sum: i64) -> Result<(), KeyStoreError> {
        let path = self.round_dir(round).join(TERMINAL_FILE);
        let record = TerminalFile {
            round: round.to_string(),
            result: sum,
        };
        write_atomic(&path, &to_json(&path, &record)?).map_err(|e| io_err(&path, e))?;
        debug!("Round {:?} marked terminal", round);
        Ok(())
    }

    fn terminal_result(&self, round: &str) -> Result<Option<i64>, KeyStoreError> {
        let path = self.round_dir(round).join(TERMINAL_FILE);
        Ok(self.read_json::<TerminalFile>(&path)?.map(|t| t.result))
    }

    fn node_key(&self) -> Result<[u8; 32], KeyStoreError> {
        let path = self.root.join(NODE_KEY_FILE);
        if let Some(bytes) = self.read_optional(&path)? {
            let text = String::from_utf8(bytes).map_err(|_| corrupt(&path, "not UTF-8"))?;
            let mut key = [0u8; 32];
            hex::decode_to_slice(text.trim(), &mut key)
                .map_err(|e| corrupt(&path, e.to_string()))?;
            return Ok(key);
        }

        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        self.write_private(&path, hex::encode(key).as_bytes())?;
        info!("Created node key at {}", path.display());
        Ok(key)
    }
}

// ============================================================================
// In-Memory Key Store
// ============================================================================

#[derive(Default)]
struct MemoryKeys {
    /// Serialized private keys
    keypairs: HashMap<String, serde_json::Value>,
    initiated: HashSet<String>,
    terminal: HashMap<String, i64>,
    node_key: Option<[u8; 32]>,
}

/// Volatile key store for simulations and tests. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    inner: Arc<Mutex<MemoryKeys>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryKeys> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop the keypair for `round`, as if the private directory was lost.
    pub fn forget_keypair(&self, round: &str) {
        self.lock().keypairs.remove(round);
    }
}

impl KeyStore for MemoryKeyStore {
    fn put_keypair<C: Cryptosystem>(
        &self,
        crypto: &C,
        round: &str,
        keypair: &C::Keypair,
    ) -> Result<(), KeyStoreError> {
        let private = serde_json::to_value(crypto.private_key(keypair))
            .map_err(|e| corrupt(Path::new(round), e.to_string()))?;
        self.lock().keypairs.insert(round.to_string(), private);
        Ok(())
    }

    fn get_keypair<C: Cryptosystem>(
        &self,
        crypto: &C,
        round: &str,
    ) -> Result<C::Keypair, KeyStoreError> {
        let private = self
            .lock()
            .keypairs
            .get(round)
            .cloned()
            .ok_or_else(|| KeyStoreError::NotFound(round.to_string()))?;
        let private: C::PrivateKey = serde_json::from_value(private)
            .map_err(|e| corrupt(Path::new(round), e.to_string()))?;
        Ok(crypto.keypair_from_private(private))
    }

    fn mark_initiated(&self, round: &str) -> Result<(), KeyStoreError> {
        self.lock().initiated.insert(round.to_string());
        Ok(())
    }

    fn is_initiated(&self, round: &str) -> Result<bool, KeyStoreError> {
        Ok(self.lock().initiated.contains(round))
    }

    fn mark_terminal(&self, round: &str, sum: i64) -> Result<(), KeyStoreError> {
        self.lock().terminal.insert(round.to_string(), sum);
        Ok(())
    }

    fn terminal_result(&self, round: &str) -> Result<Option<i64>, KeyStoreError> {
        Ok(self.lock().terminal.get(round).copied())
    }

    fn node_key(&self) -> Result<[u8; 32], KeyStoreError> {
        let mut keys = self.lock();
        let key = keys.node_key.get_or_insert_with(|| {
            let mut key = [0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut key);
            key
        });
        Ok(*key)
    }
}
