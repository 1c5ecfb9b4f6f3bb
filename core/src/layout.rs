//! Shared storage layout
//!
//! ```text
//! <sync_folder>/
//! └── <participant>/
//!     ├── app_pipelines/<app>/rolling_sum.json   inbox (written by predecessor)
//!     ├── public/<app>/result.json               published sum (collector only)
//!     └── private/<app>/                         key store, secret input
//! ```

use std::path::{Path, PathBuf};

const INBOX_FILE: &str = "rolling_sum.json";
const RESULT_FILE: &str = "result.json";
const SECRET_FILE: &str = "secret.json";

/// Paths of every participant under one shared root and application name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    sync_folder: PathBuf,
    app_name: String,
}

impl StorageLayout {
    pub fn new(sync_folder: impl Into<PathBuf>, app_name: impl Into<String>) -> Self {
        Self {
            sync_folder: sync_folder.into(),
            app_name: app_name.into(),
        }
    }

    pub fn sync_folder(&self) -> &Path {
        &self.sync_folder
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn user_dir(&self, id: &str) -> PathBuf {
        self.sync_folder.join(id)
    }

    /// Directory holding `id`'s inbox
    pub fn app_dir(&self, id: &str) -> PathBuf {
        self.user_dir(id).join("app_pipelines").join(&self.app_name)
    }

    /// Single-slot inbox written by `id`'s predecessor
    pub fn inbox(&self, id: &str) -> PathBuf {
        self.app_dir(id).join(INBOX_FILE)
    }

    pub fn public_dir(&self, id: &str) -> PathBuf {
        self.user_dir(id).join("public").join(&self.app_name)
    }

    /// Where the collector publishes `{"result": n}`
    pub fn result(&self, collector: &str) -> PathBuf {
        self.public_dir(collector).join(RESULT_FILE)
    }

    /// Local-only directory for key material and the secret input
    pub fn private_dir(&self, id: &str) -> PathBuf {
        self.user_dir(id).join("private").join(&self.app_name)
    }

    pub fn default_secret(&self, id: &str) -> PathBuf {
        self.private_dir(id).join(SECRET_FILE)
    }
}
