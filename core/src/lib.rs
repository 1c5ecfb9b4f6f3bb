//! Ringhe Core
//!
//! Ring-passed encrypted sum aggregation over a shared, eventually
//! consistent folder tree.
//!
//! ```text
//!   ┌──────────┐ Enc(s₀)  ┌──────────┐ +Enc(s₁) ┌──────────┐
//!   │ collector│─────────▶│ node 1   │─────────▶│ node 2   │──┐
//!   │ (index 0)│          └──────────┘          └──────────┘  │
//!   └────▲─────┘                                              │
//!        │          Enc(s₀ + s₁ + … + sₙ₋₁)                   │
//!        └────────────────────────────────────────────────────┘
//!   decrypt → publish result.json
//! ```
//!
//! Each invocation of a node reads its inbox, does at most one protocol
//! step, and exits. See [`node`] for the state machine.

pub mod context;
pub mod error;
pub mod keystore;
pub mod layout;
pub mod mailbox;
pub mod node;
pub mod permissions;
pub mod secret;

pub use context::NodeContext;
pub use error::{ErrorKind, RingError};
pub use keystore::{FsKeyStore, KeyStore, KeyStoreError, MemoryKeyStore};
pub use layout::StorageLayout;
pub use mailbox::{FsMailbox, Mailbox, MailboxError, MemoryMailbox};
pub use node::{NodeState, Outcome, PublishedResult, RingNode};
pub use permissions::{SyftPermission, setup_node};
pub use secret::{SecretError, load_secret};

use ringhe_paillier::Paillier;

/// A Paillier node over the local synced folder
pub type FsRingNode = RingNode<FsMailbox, FsKeyStore, Paillier>;

/// Open the filesystem-backed node for `ctx`.
///
/// The secret is loaded here, so a missing or invalid secret fails before
/// any mailbox access.
pub fn open_node(ctx: NodeContext) -> Result<FsRingNode, RingError> {
    ctx.topology()?;
    let secret = load_secret(&ctx.secret_path)?;
    let keys = FsKeyStore::new(ctx.layout.private_dir(&ctx.self_id));
    Ok(RingNode::new(ctx, secret, FsMailbox::new(), keys, Paillier))
}
