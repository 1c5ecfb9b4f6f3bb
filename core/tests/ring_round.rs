use std::fs;
use std::path::Path;

use ringhe_config::RingheConfig;
use ringhe_core::{
    ErrorKind, FsRingNode, KeyStore, NodeContext, NodeState, Outcome, PublishedResult,
    StorageLayout, open_node, setup_node,
};
use ringhe_paillier::{MIN_KEY_BITS, Paillier};
use tempfile::TempDir;

const APP: &str = "ring-he";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn context(sync: &Path, participants: &[&str], me: &str) -> NodeContext {
    init_logging();
    NodeContext::new(
        me,
        participants.iter().map(|s| s.to_string()).collect(),
        "r1",
        StorageLayout::new(sync, APP),
        MIN_KEY_BITS,
    )
}

fn write_secret(ctx: &NodeContext, value: i64) {
    let path = &ctx.secret_path;
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!(r#"{{ "data": {} }}"#, value)).unwrap();
}

/// One node per participant, each with its own secret file.
fn ring(sync: &Path, secrets: &[(&str, i64)]) -> Vec<FsRingNode> {
    let ids: Vec<&str> = secrets.iter().map(|(id, _)| *id).collect();
    secrets
        .iter()
        .map(|(id, value)| {
            let ctx = context(sync, &ids, id);
            write_secret(&ctx, *value);
            open_node(ctx).unwrap()
        })
        .collect()
}

fn published(sync: &Path, collector: &str) -> i64 {
    let path = StorageLayout::new(sync, APP).result(collector);
    let result: PublishedResult = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
    result.result
}

#[test]
fn three_node_round_in_order() {
    let dir = TempDir::new().unwrap();
    let nodes = ring(dir.path(), &[("alice", 3), ("bob", 4), ("carol", 5)]);

    assert_eq!(
        nodes[0].step().unwrap(),
        Outcome::Initiated {
            successor: "bob".into()
        }
    );
    assert_eq!(
        nodes[1].step().unwrap(),
        Outcome::Forwarded {
            successor: "carol".into()
        }
    );
    assert_eq!(
        nodes[2].step().unwrap(),
        Outcome::Forwarded {
            successor: "alice".into()
        }
    );
    assert_eq!(nodes[0].step().unwrap(), Outcome::Collected { sum: 12 });

    assert_eq!(published(dir.path(), "alice"), 12);
    let layout = StorageLayout::new(dir.path(), APP);
    for id in ["alice", "bob", "carol"] {
        assert!(!layout.inbox(id).exists(), "{} inbox left behind", id);
    }
}

#[test]
fn arbitrary_schedule_converges() {
    let dir = TempDir::new().unwrap();
    let nodes = ring(
        dir.path(),
        &[("n0", -20), ("n1", 7), ("n2", 0), ("n3", 1_000_000), ("n4", -1)],
    );

    // every node wakes in reverse order until the collector finishes
    let mut sum = None;
    for _ in 0..10 {
        for node in nodes.iter().rev() {
            if let Outcome::Collected { sum: s } = node.step().unwrap() {
                sum = Some(s);
            }
        }
        if sum.is_some() {
            break;
        }
    }
    assert_eq!(sum, Some(999_986));

    // afterwards every node is a no-op
    for node in &nodes {
        assert!(node.step().unwrap().is_noop());
    }
    assert_eq!(nodes[0].assess().unwrap(), NodeState::Terminal);
}

#[test]
fn terminal_collector_clears_stale_inbox() {
    let dir = TempDir::new().unwrap();
    let nodes = ring(dir.path(), &[("a", 1), ("b", 2)]);

    let genesis_path = StorageLayout::new(dir.path(), APP).inbox("b");
    nodes[0].step().unwrap();
    let genesis = fs::read(&genesis_path).unwrap();
    nodes[1].step().unwrap();
    assert_eq!(nodes[0].step().unwrap(), Outcome::Collected { sum: 3 });

    // a delayed duplicate of a round message under the round key shows up again
    let inbox = StorageLayout::new(dir.path(), APP).inbox("a");
    fs::write(&inbox, &genesis).unwrap();
    assert_eq!(
        nodes[0].step().unwrap(),
        Outcome::AlreadyTerminal { sum: 3 }
    );
    assert!(!inbox.exists());
    assert_eq!(published(dir.path(), "a"), 3);
}

#[test]
fn key_material_survives_restart() {
    let dir = TempDir::new().unwrap();
    let ids = ["a", "b"];
    let nodes = ring(dir.path(), &[("a", 10), ("b", 32)]);
    nodes[0].step().unwrap();
    nodes[1].step().unwrap();
    let round_key = nodes[0].keys().get_keypair(&Paillier, "r1").unwrap();
    drop(nodes);

    // a fresh process for the collector finds its key on disk
    let collector = open_node(context(dir.path(), &ids, "a")).unwrap();
    assert_eq!(collector.keys().get_keypair(&Paillier, "r1").unwrap().public, round_key.public);
    assert_eq!(collector.step().unwrap(), Outcome::Collected { sum: 42 });
}

#[test]
fn missing_secret_fails_before_any_write() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path(), &["a", "b"], "a");

    let err = open_node(ctx).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn outsider_fails_with_configuration_error() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path(), &["a", "b"], "mallory");
    write_secret(&ctx, 1);

    let err = open_node(ctx).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!StorageLayout::new(dir.path(), APP).inbox("a").exists());
}

#[test]
fn from_config_with_permissions() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let mut config = RingheConfig::default();
    config.node.user_id = Some("solo".into());
    config.node.sync_folder = Some(dir.path().to_path_buf());
    config.ring.participants = vec!["solo".into()];
    config.crypto.key_bits = MIN_KEY_BITS;

    let ctx = NodeContext::from_config(&config).unwrap();
    let (_, topology) = ctx.topology().unwrap();
    let written = setup_node(&ctx.layout, &ctx.self_id, &topology).unwrap();
    assert_eq!(written.len(), 2);
    write_secret(&ctx, -8);

    let node = open_node(ctx).unwrap();
    assert_eq!(node.assess().unwrap(), NodeState::AwaitingGenesis);
    node.step().unwrap();
    assert_eq!(node.step().unwrap(), Outcome::Collected { sum: -8 });
    assert_eq!(published(dir.path(), "solo"), -8);
}
