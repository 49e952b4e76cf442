//! Cluster node entry point.
//!
//! Starts one hashbreak node in either role:
//!
//! ```bash
//! cargo run --bin node -- master --bind 127.0.0.1:7700 --input passwords.csv
//! cargo run --bin node -- worker --seed 127.0.0.1:7700
//! ```

use clap::{Parser, Subcommand};
use hashbreak_core::cluster::ClusterNode;
use hashbreak_core::config::ClusterConfig;
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(author, version, about = "hashbreak cluster node", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the coordinator node with reader, collector and local workers
    Master {
        /// Transport endpoint bind address
        #[arg(long, default_value = "127.0.0.1:7700")]
        bind: String,
        /// Input file with one record per line
        #[arg(long)]
        input: PathBuf,
        /// Worker actors hosted on this node (defaults to the CPU count)
        #[arg(long)]
        workers: Option<usize>,
        /// Node identifier, also the seed id workers probe for
        #[arg(long, default_value = "master")]
        node_id: String,
    },
    /// Run a compute node that registers its workers with the master
    Worker {
        /// Transport endpoint bind address (port 0 picks a free port)
        #[arg(long, default_value = "127.0.0.1:0")]
        bind: String,
        /// Address of the master's transport endpoint
        #[arg(long)]
        seed: String,
        /// Node id of the master
        #[arg(long, default_value = "master")]
        seed_id: String,
        /// Worker actors hosted on this node (defaults to the CPU count)
        #[arg(long)]
        workers: Option<usize>,
        /// Node identifier (defaults to a random one)
        #[arg(long)]
        node_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();
    let config = ClusterConfig::default();

    let node = match cli.command {
        Command::Master {
            bind,
            input,
            workers,
            node_id,
        } => {
            let mut node = ClusterNode::master(node_id, bind, input, config);
            if let Some(workers) = workers {
                node = node.with_local_workers(workers);
            }
            node
        }
        Command::Worker {
            bind,
            seed,
            seed_id,
            workers,
            node_id,
        } => {
            let node_id =
                node_id.unwrap_or_else(|| format!("worker-node-{}", uuid::Uuid::new_v4()));
            let mut node = ClusterNode::worker(node_id, bind, seed_id, seed, config);
            if let Some(workers) = workers {
                node = node.with_local_workers(workers);
            }
            node
        }
    };

    let shutdown = node.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    node.run().await?;
    Ok(())
}
