//! Ringhe Protocol
//!
//! Ring topology resolution, the cryptosystem seam, and the `RingMessage`
//! wire format.
//!
//! ```text
//!   collector ──▶ p1 ──▶ p2 ──▶ … ──▶ p(n-1)
//!       ▲                                 │
//!       └─────────────────────────────────┘
//!   each edge is a single-slot mailbox holding one RingMessage
//! ```

pub mod crypto;
pub mod message;
pub mod topology;

pub use crypto::{CryptoError, Cryptosystem};
pub use message::{CodecError, RingMessage, WIRE_VERSION};
pub use topology::{Ring, Topology, TopologyError, check_path_component, resolve};
