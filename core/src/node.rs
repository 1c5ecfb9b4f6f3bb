//! Ring Aggregation State Machine
//!
//! Driven once per invocation. Nothing is kept in memory between runs; the
//! node's state is recomputed from the mailbox and the key store.
//!
//! ```text
//!                      ┌──────────────┐
//!    collector ───────▶│ terminal?    │── yes ──▶ AlreadyTerminal (drop leftover inbox)
//!                      └──────┬───────┘
//!                             │ no
//!                      ┌──────▼───────┐
//!                      │ inbox?       │── yes ──▶ Collect: decrypt → publish
//!                      └──────┬───────┘           → mark terminal → delete inbox
//!                             │ no
//!                      ┌──────▼───────┐
//!                      │ initiated?   │── yes ──▶ Idle (round in flight)
//!                      └──────┬───────┘
//!                             │ no
//!                             ▼
//!                      Initiate: keypair → encrypt own secret → write successor
//!
//!    participant ──▶ inbox? ── no ──▶ Idle
//!                       │ yes
//!                       ▼
//!                    Forward: add Enc(secret) → write successor → delete inbox
//! ```
//!
//! A collector inbox holding the final message of a round the collector has
//! already completed, under that round's key, is a leftover of a crash
//! between marking the round terminal and deleting the inbox. It is deleted
//! instead of collected, in that round and in any later one.
//!
//! Every outbound write happens strictly before the matching inbound delete,
//! and the encryption randomness of a step is derived from the node key and
//! the step's input, so a retried step rewrites byte-identical content.

use std::path::Path;

use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::{OsRng, StdRng};
use ringhe_protocol::{CodecError, Cryptosystem, Ring, RingMessage, Topology};
use serde::{Deserialize, Serialize};

use crate::context::NodeContext;
use crate::error::RingError;
use crate::keystore::{KeyStore, KeyStoreError};
use crate::mailbox::Mailbox;

const GENESIS_DOMAIN: &[u8] = b"ringhe-genesis-v1";
const FORWARD_DOMAIN: &[u8] = b"ringhe-forward-v1";

/// Per-node state, derived on every invocation and never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// No pending work (including a collector whose round is in flight)
    Idle,
    /// Collector with no genesis yet: must initiate
    AwaitingGenesis,
    /// A message sits in this node's inbox: forward, or collect if collector
    HasInbound,
    /// Collector already published the result for this round
    Terminal,
}

/// What a single invocation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Collector generated the round key and sent the genesis message
    Initiated { successor: String },
    /// Participant added its contribution and passed the message on
    Forwarded { successor: String },
    /// Collector decrypted and published the sum
    Collected { sum: i64 },
    /// Nothing to do this invocation
    Idle,
    /// Round already complete. At most a leftover copy of its final message
    /// was removed from the inbox.
    AlreadyTerminal { sum: i64 },
}

impl Outcome {
    /// True when the invocation made no protocol progress
    pub fn is_noop(&self) -> bool {
        matches!(self, Outcome::Idle | Outcome::AlreadyTerminal { .. })
    }
}

/// Published result document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedResult {
    pub result: i64,
}

/// One participant's protocol logic over a mailbox, a key store and a
/// cryptosystem.
pub struct RingNode<M, K, C> {
    ctx: NodeContext,
    secret: i64,
    mailbox: M,
    keys: K,
    crypto: C,
}

impl<M: Mailbox, K: KeyStore, C: Cryptosystem> RingNode<M, K, C> {
    pub fn new(ctx: NodeContext, secret: i64, mailbox: M, keys: K, crypto: C) -> Self {
        Self {
            ctx,
            secret,
            mailbox,
            keys,
            crypto,
        }
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    pub fn mailbox(&self) -> &M {
        &self.mailbox
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    pub fn crypto(&self) -> &C {
        &self.crypto
    }

    /// Derive the current state without changing anything.
    pub fn assess(&self) -> Result<NodeState, RingError> {
        let (_, topology) = self.ctx.topology()?;
        let inbox = self.ctx.layout.inbox(&self.ctx.self_id);

        if !topology.is_collector() {
            return Ok(if self.mailbox.exists(&inbox)? {
                NodeState::HasInbound
            } else {
                NodeState::Idle
            });
        }

        let round = &self.ctx.round;
        if self.keys.is_terminal(round)? {
            Ok(NodeState::Terminal)
        } else if self.mailbox.exists(&inbox)? {
            Ok(NodeState::HasInbound)
        } else if self.keys.is_initiated(round)? {
            Ok(NodeState::Idle)
        } else {
            Ok(NodeState::AwaitingGenesis)
        }
    }

    /// Run one invocation of the protocol.
    ///
    /// Configuration errors are raised before any mailbox access.
    pub fn step(&self) -> Result<Outcome, RingError> {
        let (ring, topology) = self.ctx.topology()?;
        debug!(
            "{} at position {} of {} (successor {})",
            self.ctx.self_id,
            topology.index,
            ring.len(),
            topology.successor
        );

        if topology.is_collector() {
            self.step_collector(&ring, &topology)
        } else {
            self.step_participant()
        }
    }

    // ------------------------------------------------------------------------
    // Collector
    // ------------------------------------------------------------------------

    fn step_collector(&self, ring: &Ring, topology: &Topology) -> Result<Outcome, RingError> {
        let round = &self.ctx.round;
        let inbox = self.ctx.layout.inbox(&self.ctx.self_id);

        if let Some(sum) = self.keys.terminal_result(round)? {
            // finish a collect that crashed before consuming its inbox
            if self.mailbox.exists(&inbox)? {
                self.discard_finished(&inbox)?;
            }
            info!("Round {:?} already complete (sum published)", round);
            return Ok(Outcome::AlreadyTerminal { sum });
        }

        if self.mailbox.exists(&inbox)? && !self.discard_finished(&inbox)? {
            return self.collect();
        }

        if self.keys.is_initiated(round)? {
            info!("Round {:?} in flight, waiting for the message to return", round);
            return Ok(Outcome::Idle);
        }

        self.initiate(ring, topology)
    }

    /// Delete the inbox if it holds the final message of a round this node
    /// already completed, under that round's own key.
    ///
    /// Anything else is left in place and reported as not discarded.
    fn discard_finished(&self, inbox: &Path) -> Result<bool, RingError> {
        let bytes = self.mailbox.read(inbox)?;
        let message = match RingMessage::decode(&self.crypto, &bytes) {
            Ok(message) => message,
            Err(e) => {
                debug!("Inbox message is not a finished round: {}", e);
                return Ok(false);
            }
        };
        if !self.keys.is_terminal(&message.round)? {
            return Ok(false);
        }

        let keypair = match self.keys.get_keypair(&self.crypto, &message.round) {
            Ok(keypair) => keypair,
            Err(KeyStoreError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if self.crypto.public_key(&keypair) != &message.public_key {
            warn!(
                "Inbox holds a round {:?} message under a foreign key; leaving it",
                message.round
            );
            return Ok(false);
        }

        self.mailbox.delete(inbox)?;
        info!(
            "Removed leftover message of completed round {:?}",
            message.round
        );
        Ok(true)
    }

    fn initiate(&self, ring: &Ring, topology: &Topology) -> Result<Outcome, RingError> {
        let round = &self.ctx.round;

        // A keypair without the genesis marker means a previous genesis
        // crashed before completing; reuse it so the rewrite is identical.
        let keypair = match self.keys.get_keypair(&self.crypto, round) {
            Ok(keypair) => {
                warn!("Resuming interrupted genesis for round {:?}", round);
                keypair
            }
            Err(KeyStoreError::NotFound(_)) => self.generate_round_key()?,
            Err(e) => return Err(e.into()),
        };
        let public = self.crypto.public_key(&keypair);

        let mut rng = self.genesis_rng(public)?;
        let accumulator = self.crypto.encrypt(public, self.secret, &mut rng)?;
        let message: RingMessage<C> =
            RingMessage::new(round.clone(), ring.clone(), public.clone(), accumulator);

        let outbox = self.ctx.layout.inbox(&topology.successor);
        self.mailbox.write(&outbox, &message.encode(&self.crypto)?)?;
        self.keys.mark_initiated(round)?;

        info!(
            "Started round {:?} with key {:?}, passed to {}",
            round, public, topology.successor
        );
        Ok(Outcome::Initiated {
            successor: topology.successor.clone(),
        })
    }

    fn generate_round_key(&self) -> Result<C::Keypair, RingError> {
        info!(
            "Generating {}-bit keypair for round {:?}",
            self.ctx.key_bits, self.ctx.round
        );
        let keypair = self
            .crypto
            .generate_keypair(self.ctx.key_bits, &mut OsRng)?;
        self.keys
            .put_keypair(&self.crypto, &self.ctx.round, &keypair)?;
        Ok(keypair)
    }

    fn collect(&self) -> Result<Outcome, RingError> {
        let round = &self.ctx.round;
        let inbox = self.ctx.layout.inbox(&self.ctx.self_id);

        let bytes = self.mailbox.read(&inbox)?;
        let message = RingMessage::decode(&self.crypto, &bytes)?;

        if message.round != *round {
            return Err(RingError::malformed(format!(
                "inbound message belongs to round {:?}, expected {:?}",
                message.round, round
            )));
        }
        if message.participants.collector() != self.ctx.self_id {
            return Err(RingError::malformed(format!(
                "inbound message names {:?} as collector",
                message.participants.collector()
            )));
        }

        let keypair = self.keys.get_keypair(&self.crypto, round)?;
        let public = self.crypto.public_key(&keypair);
        if &message.public_key != public {
            warn!(
                "Inbound message is under key {:?}, round key is {:?}",
                message.public_key, public
            );
        }
        let sum = self.crypto.decrypt(&keypair, &message.accumulator)?;

        // publish, then mark terminal, then consume
        let published = PublishedResult { result: sum };
        let result_path = self.ctx.layout.result(&self.ctx.self_id);
        let body = serde_json::to_vec_pretty(&published).map_err(CodecError::from)?;
        self.mailbox.write(&result_path, &body)?;
        self.keys.mark_terminal(round, sum)?;
        self.mailbox.delete(&inbox)?;

        info!(
            "Round {:?} complete: sum of {} participants published at {}",
            round,
            message.participants.len(),
            result_path.display()
        );
        Ok(Outcome::Collected { sum })
    }

    fn genesis_rng(&self, public: &C::PublicKey) -> Result<StdRng, RingError> {
        let node_key = self.keys.node_key()?;
        let mut hasher = blake3::Hasher::new_keyed(&node_key);
        hasher.update(GENESIS_DOMAIN);
        hasher.update(self.ctx.round.as_bytes());
        hasher.update(&self.crypto.fingerprint(public));
        Ok(StdRng::from_seed(*hasher.finalize().as_bytes()))
    }

    // ------------------------------------------------------------------------
    // Participant
    // ------------------------------------------------------------------------

    fn step_participant(&self) -> Result<Outcome, RingError> {
        let inbox = self.ctx.layout.inbox(&self.ctx.self_id);
        if !self.mailbox.exists(&inbox)? {
            debug!("No message in {}", inbox.display());
            return Ok(Outcome::Idle);
        }

        let bytes = self.mailbox.read(&inbox)?;
        let message = RingMessage::decode(&self.crypto, &bytes)?;

        // The ring carried by the message is authoritative for this round
        let topology = message.participants.resolve(&self.ctx.self_id)?;
        if topology.is_collector() {
            return Err(RingError::malformed(format!(
                "inbound message names this node ({}) as collector",
                self.ctx.self_id
            )));
        }
        if message.participants.participants() != self.ctx.participants.as_slice() {
            warn!("Inbound ring differs from configured ring; following the message");
        }
        if message.round != self.ctx.round {
            debug!(
                "Forwarding round {:?} (configured {:?})",
                message.round, self.ctx.round
            );
        }

        let mut rng = self.forward_rng(&bytes)?;
        let contribution = self
            .crypto
            .encrypt(&message.public_key, self.secret, &mut rng)?;
        let accumulator =
            self.crypto
                .add(&message.public_key, &message.accumulator, &contribution)?;
        let outbound = message.with_accumulator(accumulator);

        // write, then delete
        let outbox = self.ctx.layout.inbox(&topology.successor);
        self.mailbox.write(&outbox, &outbound.encode(&self.crypto)?)?;
        self.mailbox.delete(&inbox)?;

        info!(
            "Added contribution to round {:?} ({:?} -> {:?}), passed to {}",
            message.round, message.accumulator, outbound.accumulator, topology.successor
        );
        Ok(Outcome::Forwarded {
            successor: topology.successor,
        })
    }

    fn forward_rng(&self, inbound: &[u8]) -> Result<StdRng, RingError> {
        let node_key = self.keys.node_key()?;
        let mut hasher = blake3::Hasher::new_keyed(&node_key);
        hasher.update(FORWARD_DOMAIN);
        hasher.update(inbound);
        Ok(StdRng::from_seed(*hasher.finalize().as_bytes()))
    }
}
