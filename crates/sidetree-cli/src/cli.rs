use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sidetree",
    about = "Sidetree on a permissioned ledger: operator tools",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Inspect a node's persistent operation queue
    Queue(QueueArgs),
    /// Check a protocol parameter file
    Protocol(ProtocolArgs),
    /// Decode an anchor string or ledger key
    Anchor(AnchorArgs),
    /// Validate a node configuration file
    Config(ConfigArgs),
    /// Run an in-memory node end to end
    Demo(DemoArgs),
}

#[derive(Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub action: QueueAction,
}

#[derive(Subcommand)]
pub enum QueueAction {
    /// Number of queued operations
    Len(QueueLocation),
    /// Show operations at the head of the queue
    Peek {
        #[command(flatten)]
        location: QueueLocation,
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },
}

/// The queue of one (channel, namespace) under a queue directory. The
/// owning node must be stopped: queues are opened exclusively.
#[derive(Args)]
pub struct QueueLocation {
    #[arg(long)]
    pub dir: PathBuf,
    #[arg(long)]
    pub channel: String,
    #[arg(long)]
    pub namespace: String,
}

#[derive(Args)]
pub struct ProtocolArgs {
    #[command(subcommand)]
    pub action: ProtocolAction,
}

#[derive(Subcommand)]
pub enum ProtocolAction {
    /// Parse and validate every version in a protocol file
    Validate { file: PathBuf },
    /// Print the default version 1 parameters
    Default {
        #[arg(long, default_value = "0")]
        genesis_time: u64,
    },
}

#[derive(Args)]
pub struct AnchorArgs {
    #[command(subcommand)]
    pub action: AnchorAction,
}

#[derive(Subcommand)]
pub enum AnchorAction {
    /// Parse `<count>.<cid>`, with or without the ledger key prefix
    Parse {
        anchor: String,
        #[arg(long, default_value = "100")]
        max_cas_uri_length: usize,
    },
}

#[derive(Args)]
pub struct ConfigArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct DemoArgs {
    /// Create operations to submit
    #[arg(short = 'n', long, default_value = "3")]
    pub operations: u32,
    #[arg(long, default_value = "mychannel")]
    pub channel: String,
    #[arg(long, default_value = "did:sidetree")]
    pub namespace: String,
}
