use std::path::PathBuf;

use clap::Parser;

/// CLI surface for the node binary (§6): cluster identity, listen port, the
/// static peer address book, and the ambient flags in §10.3. `--peers` is
/// the full cluster's client-port address list in `node-id` order,
/// including this node's own entry.
#[derive(Parser, Debug)]
#[command(name = "kvstore-node", about = "Replicated key-value store node", version)]
pub struct Cli {
    #[arg(long)]
    pub node_id: u16,

    #[arg(long)]
    pub port: u16,

    #[arg(long, value_delimiter = ',')]
    pub peers: Vec<String>,

    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[arg(long)]
    pub primary: bool,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub metrics_port: Option<u16>,
}
