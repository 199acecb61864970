//! Single-decree Paxos peer.
//!
//! ```text
//! decree-node -h <hostfile> [-v <value>] [-t <seconds>]
//! ```
//!
//! Diagnostics go to stderr (`RUST_LOG` controls the filter); stdout
//! carries one JSON event per line for every message sent, message
//! received, and value chosen.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use decree_node::error::NodeError;
use decree_node::node::{self, NodeConfig};
use decree_node::topology::Topology;
use error_stack::{Report, ResultExt};
use tracing::error;

/// Run a single-decree Paxos peer.
///
/// The auto short help flag is disabled because `-h` names the hostfile.
#[derive(Parser, Debug)]
#[command(name = "decree-node", disable_help_flag = true)]
#[command(about = "Run a single-decree Paxos peer")]
struct Args {
    /// Path to the hostfile
    #[arg(short = 'h', long)]
    hostfile: PathBuf,

    /// Value to propose; required when this host declares a proposer role
    #[arg(short = 'v', long)]
    value: Option<String>,

    /// Seconds to wait after connections are established before proposing
    #[arg(short = 't', long = "wait", default_value_t = 0.0)]
    wait: f64,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help, value_parser = clap::value_parser!(bool))]
    help: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<(), Report<NodeError>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let hostname = hostname::get()
        .change_context(NodeError)
        .attach_printable("resolving the OS hostname")?
        .to_string_lossy()
        .into_owned();

    let topology = Topology::load(&args.hostfile).change_context(NodeError)?;

    let config = NodeConfig::new(
        topology,
        hostname,
        args.value,
        Duration::from_secs_f64(args.wait.max(0.0)),
    );
    let mut node = node::start(config).await.change_context(NodeError)?;

    // The process runs until externally terminated; any task ending in an
    // error is fatal.
    while let Some(joined) = node.tasks.join_next().await {
        let result = joined.change_context(NodeError)?;
        if let Err(task_error) = result {
            error!(%task_error, "fatal task failure");
            return Err(Report::new(task_error).change_context(NodeError));
        }
    }
    Ok(())
}
