//! Topology Resolver
//!
//! Derives ring order, the collector and this node's neighbours from an
//! ordered participant list. Index 0 is always the collector.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Topology errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("participant {0:?} is not a member of the ring")]
    NotInRing(String),

    #[error("malformed ring: {0}")]
    MalformedRing(String),
}

/// A validated, ordered participant list.
///
/// Invariants: non-empty, identities unique, every identity usable as a
/// single path component of the shared storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Ring {
    participants: Vec<String>,
}

impl Ring {
    pub fn new(participants: Vec<String>) -> Result<Self, TopologyError> {
        if participants.is_empty() {
            return Err(TopologyError::MalformedRing("ring has no participants".into()));
        }

        for (i, id) in participants.iter().enumerate() {
            check_path_component(id)?;
            if participants[..i].contains(id) {
                return Err(TopologyError::MalformedRing(format!(
                    "participant {:?} appears more than once",
                    id
                )));
            }
        }

        Ok(Self { participants })
    }

    /// The collector: initiator and sole private-key holder
    pub fn collector(&self) -> &str {
        &self.participants[0]
    }

    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.participants.iter().any(|p| p == id)
    }

    /// Resolve `self_id`'s position in the ring.
    pub fn resolve(&self, self_id: &str) -> Result<Topology, TopologyError> {
        let index = self
            .participants
            .iter()
            .position(|p| p == self_id)
            .ok_or_else(|| TopologyError::NotInRing(self_id.to_string()))?;

        let len = self.participants.len();
        Ok(Topology {
            leader: self.participants[0].clone(),
            predecessor: self.participants[(index + len - 1) % len].clone(),
            successor: self.participants[(index + 1) % len].clone(),
            index,
        })
    }
}

impl TryFrom<Vec<String>> for Ring {
    type Error = TopologyError;

    fn try_from(participants: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(participants)
    }
}

impl From<Ring> for Vec<String> {
    fn from(ring: Ring) -> Self {
        ring.participants
    }
}

/// This node's view of the ring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub leader: String,
    pub predecessor: String,
    pub successor: String,
    /// Position of this node in ring order
    pub index: usize,
}

impl Topology {
    pub fn is_collector(&self) -> bool {
        self.index == 0
    }
}

/// Resolve a raw participant list for `self_id`.
pub fn resolve(participants: &[String], self_id: &str) -> Result<Topology, TopologyError> {
    Ring::new(participants.to_vec())?.resolve(self_id)
}

/// Reject identities that cannot name a single directory of the shared storage.
pub fn check_path_component(id: &str) -> Result<(), TopologyError> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.trim() != id
        || id.chars().any(|c| c == '/' || c == '\\' || c.is_control());

    if bad {
        return Err(TopologyError::MalformedRing(format!(
            "identity {:?} is not a valid path component",
            id
        )));
    }
    Ok(())
}
