//! Mailbox Client
//!
//! Synchronous facade over the shared storage. Each inbox is a single-slot,
//! single-writer (predecessor) / single-reader (owner) queue.
//!
//! Contract relied on by the state machine:
//! - `write` is atomic: a reader sees either the old file or the complete new
//!   one, and the data is durable when `write` returns.
//! - `write` of identical bytes twice leaves the same state as once.
//! - `delete` of a missing file is a no-op.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("mailbox {op} failed for {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no message at {}", .0.display())]
    NotFound(PathBuf),
}

impl MailboxError {
    fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        MailboxError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The four primitives the protocol needs from the shared storage.
pub trait Mailbox {
    fn exists(&self, path: &Path) -> Result<bool, MailboxError>;

    fn read(&self, path: &Path) -> Result<Vec<u8>, MailboxError>;

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), MailboxError>;

    fn delete(&self, path: &Path) -> Result<(), MailboxError>;
}

// ============================================================================
// Filesystem Mailbox
// ============================================================================

/// Mailbox over a locally synced directory tree.
#[derive(Debug, Clone, Default)]
pub struct FsMailbox;

impl FsMailbox {
    pub fn new() -> Self {
        Self
    }
}

impl Mailbox for FsMailbox {
    fn exists(&self, path: &Path) -> Result<bool, MailboxError> {
        path.try_exists()
            .map_err(|e| MailboxError::io("exists", path, e))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, MailboxError> {
        fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => MailboxError::NotFound(path.to_path_buf()),
            _ => MailboxError::io("read", path, e),
        })
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), MailboxError> {
        write_atomic(path, bytes).map_err(|e| MailboxError::io("write", path, e))?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<(), MailboxError> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MailboxError::io("delete", path, e)),
        }
    }
}

/// Write `bytes` to `path` through a synced temporary file in the same
/// directory, then rename it into place.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    // Make the rename itself durable
    #[cfg(unix)]
    fs::File::open(parent)?.sync_all()?;

    Ok(())
}

// ============================================================================
// In-Memory Mailbox
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<PathBuf, Vec<u8>>,
    fail_writes: HashSet<PathBuf>,
    fail_deletes: HashSet<PathBuf>,
    writes: usize,
}

/// Shared in-memory mailbox for simulations and tests.
///
/// Clones share the same storage, so one instance can back every node of a
/// simulated ring. Individual paths can be made to fail to model crashes.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailbox {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // a panicked test thread must not poison the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every write to `path` fail until cleared
    pub fn fail_writes_to(&self, path: &Path) {
        self.lock().fail_writes.insert(path.to_path_buf());
    }

    /// Make every delete of `path` fail until cleared
    pub fn fail_deletes_of(&self, path: &Path) {
        self.lock().fail_deletes.insert(path.to_path_buf());
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_writes.clear();
        state.fail_deletes.clear();
    }

    /// Copy of every stored file
    pub fn snapshot(&self) -> HashMap<PathBuf, Vec<u8>> {
        self.lock().files.clone()
    }

    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }
}

impl Mailbox for MemoryMailbox {
    fn exists(&self, path: &Path) -> Result<bool, MailboxError> {
        Ok(self.lock().files.contains_key(path))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, MailboxError> {
        self.get(path)
            .ok_or_else(|| MailboxError::NotFound(path.to_path_buf()))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), MailboxError> {
        let mut state = self.lock();
        if state.fail_writes.contains(path) {
            return Err(MailboxError::io(
                "write",
                path,
                io::Error::new(io::ErrorKind::PermissionDenied, "injected write failure"),
            ));
        }
        state.files.insert(path.to_path_buf(), bytes.to_vec());
        state.writes += 1;
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<(), MailboxError> {
        let mut state = self.lock();
        if state.fail_deletes.contains(path) {
            return Err(MailboxError::io(
                "delete",
                path,
                io::Error::new(io::ErrorKind::Other, "injected delete failure"),
            ));
        }
        state.files.remove(path);
        Ok(())
    }
}
