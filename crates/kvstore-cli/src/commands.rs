use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use kvstore_node::NodeConfig;
use kvstore_server::{replication_port_for, KvServer, ServerConfig};
use kvstore_types::NodeId;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::FileConfig;
use crate::error::CliError;

/// Install a `tracing_subscriber` with a level filter derived from `--log-level`,
/// falling back to whatever `RUST_LOG` is set to first (§10.1).
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// CLI flag > config file > built-in default, applied field by field.
fn merge(cli: &Cli, file: &FileConfig) -> (u16, u16, Vec<String>, PathBuf, bool, u64, u64, u32, Option<u16>) {
    let defaults = NodeConfig::default();

    let node_id = cli.node_id;
    let port = cli.port;
    let peers = if !cli.peers.is_empty() {
        cli.peers.clone()
    } else {
        file.peers.clone().unwrap_or_default()
    };
    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| file.data_dir.clone())
        .unwrap_or(defaults.data_dir);
    let primary = cli.primary || file.primary.unwrap_or(false);
    let heartbeat_ms = file.heartbeat_ms.unwrap_or(defaults.heartbeat_ms);
    let election_timeout_ms = file.election_timeout_ms.unwrap_or(defaults.election_timeout_ms);
    let election_jitter_pct = file.election_jitter_pct.unwrap_or(defaults.election_jitter_pct);
    let metrics_port = cli.metrics_port.or(file.metrics_port);

    (
        node_id,
        port,
        peers,
        data_dir,
        primary,
        heartbeat_ms,
        election_timeout_ms,
        election_jitter_pct,
        metrics_port,
    )
}

/// Turns the merged `--peers` address book (every cluster member's client
/// address, indexed by position, this node's own entry included) into the
/// [`NodeConfig::peers`] id list and the [`ServerConfig::peer_addrs`] dial
/// book, excluding `self_id` from both.
fn build_peer_tables(
    self_id: NodeId,
    peers: &[String],
) -> Result<(Vec<NodeId>, BTreeMap<NodeId, SocketAddr>), CliError> {
    let mut peer_ids = Vec::new();
    let mut peer_addrs = BTreeMap::new();

    for (index, entry) in peers.iter().enumerate() {
        let id = NodeId::new(index as u16);
        let addr: SocketAddr = entry
            .parse()
            .map_err(|e| CliError::Config(format!("invalid peer address '{entry}': {e}")))?;
        if id == self_id {
            continue;
        }
        peer_ids.push(id);
        let replication_addr = SocketAddr::new(addr.ip(), replication_port_for(addr.port()));
        peer_addrs.insert(id, replication_addr);
    }

    Ok((peer_ids, peer_addrs))
}

pub fn build_config(cli: &Cli) -> Result<ServerConfig, CliError> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path).map_err(|e| CliError::Config(e.to_string()))?,
        None => FileConfig::default(),
    };

    let (node_id, port, peers, data_dir, primary, heartbeat_ms, election_timeout_ms, election_jitter_pct, metrics_port) =
        merge(cli, &file);

    let self_id = NodeId::new(node_id);
    let (peer_ids, peer_addrs) = build_peer_tables(self_id, &peers)?;

    let client_addr: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .map_err(|e| CliError::Config(format!("invalid port {port}: {e}")))?;
    let replication_addr = SocketAddr::new(client_addr.ip(), replication_port_for(port));
    let metrics_addr = metrics_port
        .map(|p| SocketAddr::new(client_addr.ip(), p));

    Ok(ServerConfig {
        node: NodeConfig {
            node_id: self_id,
            peers: peer_ids,
            data_dir,
            initial_primary: primary,
            heartbeat_ms,
            election_timeout_ms,
            election_jitter_pct,
        },
        client_addr,
        replication_addr,
        peer_addrs,
        metrics_addr,
    })
}

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let config = build_config(&cli)?;
    let server = KvServer::new(config).map_err(|e| CliError::Node(e.to_string()))?;
    server.serve().await.map_err(|e| CliError::Node(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(node_id: u16, port: u16, peers: Vec<&str>) -> Cli {
        Cli {
            node_id,
            port,
            peers: peers.into_iter().map(String::from).collect(),
            data_dir: None,
            primary: false,
            log_level: "info".to_string(),
            config: None,
            metrics_port: None,
        }
    }

    #[test]
    fn builds_peer_tables_excluding_self_and_offsetting_replication_port() {
        let addrs = vec!["127.0.0.1:7000", "127.0.0.1:7001", "127.0.0.1:7002"];
        let (ids, table) = build_peer_tables(NodeId::new(1), &addrs.into_iter().map(String::from).collect::<Vec<_>>()).unwrap();

        assert_eq!(ids, vec![NodeId::new(0), NodeId::new(2)]);
        assert_eq!(
            table.get(&NodeId::new(0)).unwrap(),
            &"127.0.0.1:8000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            table.get(&NodeId::new(2)).unwrap(),
            &"127.0.0.1:8002".parse::<SocketAddr>().unwrap()
        );
        assert!(table.get(&NodeId::new(1)).is_none());
    }

    #[test]
    fn rejects_malformed_peer_address() {
        let err = build_peer_tables(NodeId::new(0), &["not-an-address".to_string()]).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn build_config_derives_replication_and_metrics_addresses() {
        let mut c = cli(0, 7000, vec!["127.0.0.1:7000", "127.0.0.1:7001"]);
        c.metrics_port = Some(9000);

        let config = build_config(&c).unwrap();
        assert_eq!(config.client_addr.port(), 7000);
        assert_eq!(config.replication_addr.port(), 8000);
        assert_eq!(config.metrics_addr.unwrap().port(), 9000);
        assert_eq!(config.node.peers, vec![NodeId::new(1)]);
    }

    #[test]
    fn cli_primary_flag_overrides_file_default() {
        let c = cli(0, 7000, vec![]);
        assert!(!merge(&c, &FileConfig::default()).4);

        let mut primary_cli = cli(0, 7000, vec![]);
        primary_cli.primary = true;
        assert!(merge(&primary_cli, &FileConfig::default()).4);
    }
}
