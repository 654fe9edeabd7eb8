mod node_configuration;
mod replay;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use raftkv_command::{JoinCommand, LocalNode};
use raftkv_store::MemoryStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::node_configuration::NodeConfiguration;

#[derive(Debug, Parser)]
#[command(name = "raftkv-node")]
#[command(about = "Run a single raftkv node and replay a committed command log")]
#[command(version)]
struct Args {
    #[arg(long, help = "Path to the node YAML configuration")]
    config_file: PathBuf,

    #[arg(long, help = "JSON lines file of log records to propose in order")]
    log_file: Option<PathBuf>,

    #[arg(long, help = "Override the machine name from the config file")]
    name: Option<String>,

    #[arg(
        long,
        default_value_t = 1000,
        help = "Milliseconds a replayed watch may wait before its watcher is cleared"
    )]
    watch_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = NodeConfiguration::load(&args.config_file)?;
    if let Some(name) = args.name {
        config.name = name;
    }

    let store = MemoryStore::with_history_capacity(config.cluster.watch_history_capacity);
    let node = LocalNode::start(&config.name, Arc::new(store), config.cluster.clone());

    // A fresh node registers itself before serving anything else.
    node.propose(JoinCommand::new(
        config.name.clone(),
        config.raft_url.clone(),
        config.etcd_url.clone(),
    ))
    .await
    .context("Failed to register this node")?;
    info!(name = %config.name, raft_url = %config.raft_url, etcd_url = %config.etcd_url, "node registered");

    if let Some(log_file) = args.log_file {
        let stdout = std::io::stdout();
        let summary = replay::replay_file(
            &node,
            &log_file,
            &mut stdout.lock(),
            Duration::from_millis(args.watch_timeout_ms),
        )
        .await?;
        info!(
            applied = summary.applied,
            failed = summary.failed,
            "replay finished"
        );
    }

    node.shutdown().await;
    Ok(())
}
