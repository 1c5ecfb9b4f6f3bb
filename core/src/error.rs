//! Error taxonomy for a single invocation.

use ringhe_protocol::{CodecError, CryptoError, TopologyError};
use thiserror::Error;

use crate::keystore::KeyStoreError;
use crate::mailbox::MailboxError;
use crate::secret::SecretError;

/// How an invocation failed, used to pick the process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad ring, identity or secret input. Nothing was written.
    Configuration,
    /// Mailbox or key store I/O failed. Unforwarded inboxes are kept.
    Transport,
    /// Corrupt or foreign message, or lost key material. The inbox is kept for inspection.
    Cryptographic,
}

#[derive(Debug, Error)]
pub enum RingError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("invalid node configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    #[error("undecodable ring message: {0}")]
    Codec(#[from] CodecError),

    #[error("cryptographic failure: {0}")]
    Crypto(#[from] CryptoError),
}

impl RingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RingError::Topology(_) | RingError::Config(_) | RingError::Secret(_) => {
                ErrorKind::Configuration
            }
            RingError::Codec(CodecError::Ring(_)) => ErrorKind::Configuration,
            RingError::Mailbox(_) => ErrorKind::Transport,
            RingError::KeyStore(KeyStoreError::Io { .. }) => ErrorKind::Transport,
            RingError::KeyStore(_) | RingError::Codec(_) | RingError::Crypto(_) => {
                ErrorKind::Cryptographic
            }
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        RingError::Topology(TopologyError::MalformedRing(reason.into()))
    }
}
