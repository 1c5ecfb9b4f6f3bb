//! Explicit per-invocation context, built once from configuration and passed
//! to every component.

use std::path::PathBuf;

use ringhe_config::RingheConfig;
use ringhe_protocol::{Ring, Topology, check_path_component};

use crate::error::RingError;
use crate::layout::StorageLayout;

#[derive(Debug, Clone)]
pub struct NodeContext {
    /// Own participant identity
    pub self_id: String,
    /// Configured ring order; index 0 is the collector
    pub participants: Vec<String>,
    /// Round identity used to key the collector's key material
    pub round: String,
    pub layout: StorageLayout,
    /// Paillier modulus size for genesis
    pub key_bits: u64,
    /// Location of the private secret input
    pub secret_path: PathBuf,
}

impl NodeContext {
    pub fn new(
        self_id: impl Into<String>,
        participants: Vec<String>,
        round: impl Into<String>,
        layout: StorageLayout,
        key_bits: u64,
    ) -> Self {
        let self_id = self_id.into();
        let secret_path = layout.default_secret(&self_id);
        Self {
            self_id,
            participants,
            round: round.into(),
            layout,
            key_bits,
            secret_path,
        }
    }

    pub fn with_secret_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.secret_path = path.into();
        self
    }

    /// Build the context from loaded configuration.
    pub fn from_config(config: &RingheConfig) -> Result<Self, RingError> {
        let self_id = config
            .node
            .user_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| RingError::Config("node.user_id is not set".into()))?;
        let sync_folder = config
            .node
            .sync_folder
            .clone()
            .ok_or_else(|| RingError::Config("node.sync_folder is not set".into()))?;

        let layout = StorageLayout::new(sync_folder, config.node.app_name.clone());
        let ctx = Self::new(
            self_id,
            config.ring.participants.clone(),
            config.ring.round.clone(),
            layout,
            config.crypto.key_bits,
        );

        Ok(match &config.node.secret_path {
            Some(path) => ctx.with_secret_path(path),
            None => ctx,
        })
    }

    /// Validate the configured ring and locate this node in it. Performs no I/O.
    pub fn topology(&self) -> Result<(Ring, Topology), RingError> {
        check_path_component(&self.round)
            .map_err(|_| RingError::Config(format!("round {:?} is not a valid name", self.round)))?;
        check_path_component(self.layout.app_name()).map_err(|_| {
            RingError::Config(format!(
                "app name {:?} is not a valid name",
                self.layout.app_name()
            ))
        })?;

        let ring = Ring::new(self.participants.clone())?;
        let topology = ring.resolve(&self.self_id)?;
        Ok((ring, topology))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringhe_protocol::TopologyError;

    fn context(participants: &[&str], me: &str) -> NodeContext {
        NodeContext::new(
            me,
            participants.iter().map(|s| s.to_string()).collect(),
            "r1",
            StorageLayout::new("/sync", "ring-he"),
            512,
        )
    }

    #[test]
    fn test_default_secret_path() {
        let ctx = context(&["a", "b"], "b");
        assert_eq!(
            ctx.secret_path,
            PathBuf::from("/sync/b/private/ring-he/secret.json")
        );
    }

    #[test]
    fn test_topology_errors() {
        let err = context(&["a", "b"], "z").topology().unwrap_err();
        assert!(matches!(
            err,
            RingError::Topology(TopologyError::NotInRing(_))
        ));

        let err = context(&["a", "b", "a"], "a").topology().unwrap_err();
        assert!(matches!(
            err,
            RingError::Topology(TopologyError::MalformedRing(_))
        ));

        let err = context(&[], "a").topology().unwrap_err();
        assert!(matches!(
            err,
            RingError::Topology(TopologyError::MalformedRing(_))
        ));

        let mut bad_round = context(&["a"], "a");
        bad_round.round = "../escape".into();
        assert!(matches!(bad_round.topology(), Err(RingError::Config(_))));
    }

    #[test]
    fn test_from_config() {
        let mut config = RingheConfig::default();
        assert!(matches!(
            NodeContext::from_config(&config),
            Err(RingError::Config(_))
        ));

        config.node.user_id = Some("b".into());
        config.node.sync_folder = Some(PathBuf::from("/sync"));
        config.node.secret_path = Some(PathBuf::from("/secrets/b.txt"));
        config.ring.participants = vec!["a".into(), "b".into()];

        let ctx = NodeContext::from_config(&config).unwrap();
        assert_eq!(ctx.self_id, "b");
        assert_eq!(ctx.round, "default");
        assert_eq!(ctx.secret_path, PathBuf::from("/secrets/b.txt"));
        let (_, topology) = ctx.topology().unwrap();
        assert_eq!(topology.successor, "a");
    }
}
