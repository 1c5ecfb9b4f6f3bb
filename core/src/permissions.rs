//! Out-of-band access control setup.
//!
//! The shared storage honours a `_.syftperm` file per directory. The protocol
//! never reads these; `ringhe init` writes them once so that only the
//! predecessor can write this node's inbox and everyone can read the
//! published result.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use ringhe_protocol::Topology;
use serde::{Deserialize, Serialize};

use crate::layout::StorageLayout;
use crate::mailbox::write_atomic;

pub const PERMISSION_FILE: &str = "_.syftperm";

/// Principal that matches every participant
pub const EVERYONE: &str = "GLOBAL";

/// Contents of a `_.syftperm` file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyftPermission {
    pub admin: Vec<String>,
    pub read: Vec<String>,
    pub write: Vec<String>,
    pub filepath: String,
    pub terminal: bool,
}

impl SyftPermission {
    pub fn new(dir: &Path, admin: &str, read: Vec<String>, write: Vec<String>) -> Self {
        Self {
            admin: vec![admin.to_string()],
            read,
            write,
            filepath: dir.join(PERMISSION_FILE).display().to_string(),
            terminal: false,
        }
    }

    /// Create `dir` and write this permission file into it.
    pub fn ensure(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(PERMISSION_FILE);
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(&path, &bytes)?;
        info!(
            "Set permissions at {}: admin={:?}, read={:?}, write={:?}",
            dir.display(),
            self.admin,
            self.read,
            self.write
        );
        Ok(path)
    }
}

/// Create this node's directories and permission files.
///
/// - inbox directory: written by the predecessor, read by this node
/// - public result directory (collector only): readable by everyone
/// - private directory: created without a permission file
pub fn setup_node(
    layout: &StorageLayout,
    self_id: &str,
    topology: &Topology,
) -> io::Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let inbox_dir = layout.app_dir(self_id);
    let mut writers = vec![topology.predecessor.clone()];
    if topology.predecessor != self_id {
        writers.push(self_id.to_string());
    }
    let inbox = SyftPermission::new(&inbox_dir, self_id, vec![self_id.to_string()], writers);
    written.push(inbox.ensure(&inbox_dir)?);

    if topology.is_collector() {
        let public_dir = layout.public_dir(self_id);
        let public = SyftPermission::new(
            &public_dir,
            self_id,
            vec![EVERYONE.to_string()],
            vec![self_id.to_string()],
        );
        written.push(public.ensure(&public_dir)?);
    }

    fs::create_dir_all(layout.private_dir(self_id))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringhe_protocol::resolve;
    use tempfile::TempDir;

    fn ring() -> Vec<String> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    fn read_perm(path: &Path) -> SyftPermission {
        serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn participant_inbox_writable_by_predecessor() {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(dir.path(), "ring-he");
        let topology = resolve(&ring(), "b").unwrap();

        let written = setup_node(&layout, "b", &topology).unwrap();
        assert_eq!(written.len(), 1);

        let perm = read_perm(&written[0]);
        assert_eq!(perm.admin, vec!["b"]);
        assert_eq!(perm.read, vec!["b"]);
        assert_eq!(perm.write, vec!["a", "b"]);
        assert!(!perm.terminal);
        assert!(layout.private_dir("b").is_dir());
    }

    #[test]
    fn collector_also_publishes() {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(dir.path(), "ring-he");
        let topology = resolve(&ring(), "a").unwrap();

        let written = setup_node(&layout, "a", &topology).unwrap();
        assert_eq!(written.len(), 2);

        let inbox = read_perm(&written[0]);
        assert_eq!(inbox.write, vec!["c", "a"]);

        let public = read_perm(&written[1]);
        assert_eq!(public.read, vec![EVERYONE]);
        assert_eq!(
            public.filepath,
            layout.public_dir("a").join(PERMISSION_FILE).display().to_string()
        );
    }

    #[test]
    fn setup_is_repeatable() {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(dir.path(), "ring-he");
        let topology = resolve(&vec!["solo".to_string()], "solo").unwrap();

        let first = setup_node(&layout, "solo", &topology).unwrap();
        let second = setup_node(&layout, "solo", &topology).unwrap();
        assert_eq!(first, second);

        let inbox = read_perm(&first[0]);
        assert_eq!(inbox.write, vec!["solo"]);
    }
}
