//! Ringhe Configuration
//!
//! Shared configuration crate for ringhe nodes.
//!
//! Handles loading configuration from:
//! 1. RINGHE_CONFIG env var (explicit path)
//! 2. ./ringhe.toml (current directory)
//! 3. ~/.ringhe/config.toml (user home)
//!
//! Environment variables take precedence over TOML config. The loaded value is
//! handed to the node explicitly; there is no process-wide instance.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "ringhe.toml";
const CONFIG_DIR_NAME: &str = ".ringhe";
const USER_CONFIG_FILE_NAME: &str = "config.toml";

// ============================================================================
// Default Constants
// ============================================================================

pub const DEFAULT_APP_NAME: &str = "ring-he";
pub const DEFAULT_ROUND: &str = "default";
pub const DEFAULT_KEY_BITS: u64 = 2048;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RingheConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub ring: RingTomlConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
}

/// Identity of this node and location of the shared storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Own participant identity (e.g. an email address)
    #[serde(default)]
    pub user_id: Option<String>,
    /// Root of the shared mailbox storage
    #[serde(default)]
    pub sync_folder: Option<PathBuf>,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Override for the private secret input file
    #[serde(default)]
    pub secret_path: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            sync_folder: None,
            app_name: DEFAULT_APP_NAME.into(),
            secret_path: None,
        }
    }
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.into()
}

/// Ring membership (TOML format)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingTomlConfig {
    /// Ordered participants; the first one is the collector
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default = "default_round")]
    pub round: String,
}

impl Default for RingTomlConfig {
    fn default() -> Self {
        Self {
            participants: Vec::new(),
            round: DEFAULT_ROUND.into(),
        }
    }
}

fn default_round() -> String {
    DEFAULT_ROUND.into()
}

/// Cryptosystem parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// Paillier modulus size in bits
    #[serde(default = "default_key_bits")]
    pub key_bits: u64,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key_bits: DEFAULT_KEY_BITS,
        }
    }
}

fn default_key_bits() -> u64 {
    DEFAULT_KEY_BITS
}

// ============================================================================
// Override Helpers
// ============================================================================

/// Set field from variable if present
fn override_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, field: &mut String) {
    if let Some(v) = lookup(key) {
        *field = v;
    }
}

/// Set Option<T> from variable if present and parseable
fn override_option<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &mut Option<T>,
) {
    if let Some(v) = lookup(key) {
        if let Ok(parsed) = v.parse() {
            *field = Some(parsed);
        }
    }
}

/// Set field from variable if present and parseable
fn override_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &mut T,
) {
    if let Some(v) = lookup(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable value for {}: {:?}", key, v),
        }
    }
}

/// Split a comma separated list, dropping empty entries
fn parse_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ============================================================================
// Implementation
// ============================================================================

impl RingheConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check RINGHE_CONFIG env var
        if let Ok(path) = env::var("RINGHE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("RINGHE_CONFIG points to missing file: {}", path.display());
        }

        // 2. Check ./ringhe.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.ringhe/config.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply process environment overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Node
        override_option(&lookup, "RINGHE_USER_ID", &mut self.node.user_id);
        override_option(&lookup, "RINGHE_SYNC_FOLDER", &mut self.node.sync_folder);
        override_string(&lookup, "RINGHE_APP_NAME", &mut self.node.app_name);
        override_option(&lookup, "RINGHE_SECRET_PATH", &mut self.node.secret_path);

        // Ring
        if let Some(v) = lookup("RINGHE_PARTICIPANTS") {
            self.ring.participants = parse_list(&v);
        }
        override_string(&lookup, "RINGHE_ROUND", &mut self.ring.round);

        // Crypto
        override_parse(&lookup, "RINGHE_KEY_BITS", &mut self.crypto.key_bits);
    }

    /// Check that the fields every invocation needs are present
    pub fn validate(&self) -> Result<()> {
        match &self.node.user_id {
            Some(id) if !id.trim().is_empty() => {}
            _ => bail!("node.user_id is not set (config file or RINGHE_USER_ID)"),
        }
        if self.node.sync_folder.is_none() {
            bail!("node.sync_folder is not set (config file or RINGHE_SYNC_FOLDER)");
        }
        if self.node.app_name.is_empty() {
            bail!("node.app_name must not be empty");
        }
        if self.ring.round.is_empty() {
            bail!("ring.round must not be empty");
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(USER_CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.node.user_id = Some("alice@example.org".into());
        sample.node.sync_folder = Some(PathBuf::from("/var/lib/ringhe/sync"));
        sample.ring.participants = vec![
            "alice@example.org".into(),
            "bob@example.org".into(),
            "carol@example.org".into(),
        ];
        toml::to_string_pretty(&sample).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
