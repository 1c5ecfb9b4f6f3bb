use std::env;
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use log::error;
use ringhe_config::RingheConfig;
use ringhe_core::{
    ErrorKind, FsKeyStore, FsMailbox, FsRingNode, MailboxError, NodeContext, NodeState, Outcome,
    RingError, RingNode, open_node, setup_node,
};
use ringhe_paillier::Paillier;

const EXIT_OTHER: i32 = 1;
const EXIT_CONFIG: i32 = 2;
const EXIT_TRANSPORT: i32 = 3;
const EXIT_CRYPTO: i32 = 4;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    // bare flags mean the default command
    let (cmd, rest) = match args.get(1) {
        Some(arg) if !arg.starts_with("--") || arg == "--help" => (arg.as_str(), &args[2..]),
        _ => ("run", args.get(1..).unwrap_or_default()),
    };
    let config_path = parse_config_flag(rest);

    match cmd {
        "run" | "init" | "status" => {
            let ctx = match load_context(config_path) {
                Ok(ctx) => ctx,
                Err(code) => process::exit(code),
            };
            let result = match cmd {
                "run" => run(ctx),
                "init" => init(ctx),
                _ => status(ctx),
            };
            if let Err(e) = result {
                error!("{}", e);
                eprintln!("❌ {}", e);
                process::exit(exit_code(&e));
            }
        }
        "config" => {
            print!("{}", RingheConfig::generate_sample());
        }
        "help" | "--help" | "-h" => {
            print_usage();
        }
        _ => {
            println!("❌ Unknown command: {}", cmd);
            println!();
            print_usage();
            process::exit(EXIT_OTHER);
        }
    }
}

fn print_usage() {
    println!("Ringhe - encrypted ring sum over a shared folder");
    println!();
    println!("USAGE:");
    println!("  ringhe [command] [--config <path>]");
    println!();
    println!("COMMANDS:");
    println!("  run            Perform one protocol step (default)");
    println!("  init           Create directories and permission files");
    println!("  status         Show this node's state without changing anything");
    println!("  config         Print a sample configuration file");
    println!("  help           Show this help message");
    println!();
    println!("CONFIG FILE (first found):");
    println!("  --config <path>, $RINGHE_CONFIG, ./ringhe.toml, ~/.ringhe/config.toml");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("  RINGHE_USER_ID       Own participant identity");
    println!("  RINGHE_SYNC_FOLDER   Root of the shared folder tree");
    println!("  RINGHE_APP_NAME      Application directory name (default: ring-he)");
    println!("  RINGHE_SECRET_PATH   Private secret input file");
    println!("  RINGHE_PARTICIPANTS  Comma-separated ring, collector first");
    println!("  RINGHE_ROUND         Round identity (default: default)");
    println!("  RINGHE_KEY_BITS      Paillier modulus size (default: 2048)");
    println!("  RUST_LOG             Log level (debug/info/warn/error)");
    println!();
    println!("EXIT STATUS:");
    println!("  0 done or nothing to do, 2 configuration, 3 transport, 4 cryptographic");
}

fn parse_config_flag(args: &[String]) -> Option<PathBuf> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--config" {
            return args.get(i + 1).map(PathBuf::from);
        }
        i += 1;
    }
    None
}

fn exit_code(e: &RingError) -> i32 {
    match e.kind() {
        ErrorKind::Configuration => EXIT_CONFIG,
        ErrorKind::Transport => EXIT_TRANSPORT,
        ErrorKind::Cryptographic => EXIT_CRYPTO,
    }
}

/// Load configuration and build the node context, mapping failures to an exit code.
fn load_context(path: Option<PathBuf>) -> Result<NodeContext, i32> {
    let config = match path {
        Some(path) => RingheConfig::load_from(&path)
            .with_context(|| format!("Cannot use config file {}", path.display())),
        None => RingheConfig::load(),
    };
    let config = config.map_err(|e| {
        eprintln!("❌ Error loading configuration: {:#}", e);
        EXIT_OTHER
    })?;

    config.validate().map_err(|e| {
        eprintln!("❌ Invalid configuration: {:#}", e);
        EXIT_CONFIG
    })?;

    NodeContext::from_config(&config).map_err(|e| {
        eprintln!("❌ {}", e);
        exit_code(&e)
    })
}

fn run(ctx: NodeContext) -> Result<(), RingError> {
    let node = open_node(ctx)?;
    match node.step()? {
        Outcome::Initiated { successor } => {
            println!("🚀 Started round, message sent to {}", successor);
        }
        Outcome::Forwarded { successor } => {
            println!("➡️  Added contribution, message sent to {}", successor);
        }
        Outcome::Collected { sum } => {
            let path = node.context().layout.result(&node.context().self_id);
            println!("✅ Round complete: sum = {}", sum);
            println!("   Published at {}", path.display());
        }
        Outcome::Idle => {
            println!("💤 Nothing to do");
        }
        Outcome::AlreadyTerminal { sum } => {
            println!("✅ Round already complete: sum = {}", sum);
        }
    }
    Ok(())
}

fn init(ctx: NodeContext) -> Result<(), RingError> {
    let (_, topology) = ctx.topology()?;
    let written = setup_node(&ctx.layout, &ctx.self_id, &topology).map_err(|e| {
        RingError::Mailbox(MailboxError::Io {
            op: "init",
            path: ctx.layout.user_dir(&ctx.self_id),
            source: e,
        })
    })?;

    println!(
        "📁 Initialized {} (position {}, predecessor {}, successor {})",
        ctx.self_id, topology.index, topology.predecessor, topology.successor
    );
    for path in written {
        println!("   {}", path.display());
    }
    if !ctx.secret_path.exists() {
        println!(
            "⚠️  No secret input yet; write {{\"data\": <integer>}} to {}",
            ctx.secret_path.display()
        );
    }
    Ok(())
}

fn status(ctx: NodeContext) -> Result<(), RingError> {
    let (_, topology) = ctx.topology()?;
    let keys = FsKeyStore::new(ctx.layout.private_dir(&ctx.self_id));
    // assessment never reads the secret
    let node: FsRingNode = RingNode::new(ctx, 0, FsMailbox::new(), keys, Paillier);

    let role = if topology.is_collector() {
        "collector"
    } else {
        "participant"
    };
    let state = match node.assess()? {
        NodeState::Idle => "idle",
        NodeState::AwaitingGenesis => "awaiting genesis",
        NodeState::HasInbound => "message waiting",
        NodeState::Terminal => "terminal",
    };

    println!("Node:        {} ({})", node.context().self_id, role);
    println!("Round:       {}", node.context().round);
    println!("Successor:   {}", topology.successor);
    println!("State:       {}", state);
    Ok(())
}
