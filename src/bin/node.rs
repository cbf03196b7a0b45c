//! Node binary

use clap::{Parser, Subcommand};
use replog::coordinator::raft_node::RaftNode;
use replog::{Node, NodeConfig};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "replog-node")]
#[command(about = "replicated log node with HTTP front end")]
#[command(version = replog::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node: bootstrap a new cluster, or join one with --leader
    Serve {
        /// Server ID (unique in the cluster)
        #[arg(long)]
        id: Option<u64>,

        /// HTTP listen port
        #[arg(long)]
        port: Option<u16>,

        /// HTTP listen interface
        #[arg(long)]
        bind: Option<IpAddr>,

        /// Address advertised to peers
        #[arg(long)]
        address: Option<String>,

        /// Existing member to join; omit on the first node
        #[arg(long)]
        leader: Option<String>,

        /// Runtime worker threads (default: logical CPUs)
        #[arg(long)]
        threads: Option<usize>,

        /// Configuration file (TOML); also read from $REPLOG_CONFIG
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            id,
            port,
            bind,
            address,
            leader,
            threads,
            config,
        } => {
            // File and environment first, CLI has priority
            let mut node_config = NodeConfig::load(config.as_deref())?;
            if let Some(id) = id {
                node_config.server_id = id;
            }
            if let Some(port) = port {
                node_config.port = port;
            }
            if let Some(bind) = bind {
                node_config.bind_ip = bind;
            }
            if let Some(address) = address {
                node_config.address = address;
            }
            if leader.is_some() {
                node_config.leader = leader;
            }
            if threads.is_some() {
                node_config.worker_threads = threads;
            }
            node_config.validate()?;

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| node_config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(node_config.worker_threads())
                .enable_all()
                .build()?;

            let engine = Arc::new(RaftNode::with_election_delay(
                node_config.identity(),
                node_config.election_delay(),
            ));
            let node = Node::new(node_config, engine);
            runtime.block_on(node.serve())?;
        }
    }

    Ok(())
}
