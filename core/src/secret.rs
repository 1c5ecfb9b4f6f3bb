//! Private secret input.
//!
//! Each participant's contribution lives in a local-only file, either
//! `{"data": <integer>}` (any `.json` path) or a bare integer in plain text.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret input {} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("secret input {} is unreadable: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("secret input {} is not an integer: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SecretFile {
    data: i64,
}

/// Load this node's secret contribution.
pub fn load_secret(path: &Path) -> Result<i64, SecretError> {
    let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => SecretError::Missing(path.to_path_buf()),
        _ => SecretError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    parse_secret(path, &contents)
}

fn parse_secret(path: &Path, contents: &str) -> Result<i64, SecretError> {
    let invalid = |reason: String| SecretError::Invalid {
        path: path.to_path_buf(),
        reason,
    };

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str::<SecretFile>(contents)
            .map(|s| s.data)
            .map_err(|e| invalid(e.to_string()))
    } else {
        contents.trim().parse().map_err(|e: std::num::ParseIntError| invalid(e.to_string()))
    }
}
