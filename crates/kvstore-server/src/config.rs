use std::collections::BTreeMap;
use std::net::SocketAddr;

use kvstore_node::NodeConfig;
use kvstore_types::NodeId;

/// Offset applied to a node's client port to derive its replication port.
/// The client wire protocol (§6) and the replication/election protocol
/// share the same framing but are kept on separate listeners per node
/// rather than multiplexed on one port, so a slow client connection can
/// never delay a heartbeat or vote response.
pub const REPLICATION_PORT_OFFSET: u16 = 1000;

pub fn replication_port_for(client_port: u16) -> u16 {
    client_port.wrapping_add(REPLICATION_PORT_OFFSET)
}

/// Full configuration for one node process: the [`NodeConfig`] the storage
/// and membership layers are opened with, the two TCP listen addresses, the
/// address book used to dial every peer's replication port, and the
/// optional observability endpoint (§10.3).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub node: NodeConfig,
    pub client_addr: SocketAddr,
    pub replication_addr: SocketAddr,
    pub peer_addrs: BTreeMap<NodeId, SocketAddr>,
    pub metrics_addr: Option<SocketAddr>,
}
