use std::path::PathBuf;

use kvstore_types::NodeId;

/// Static configuration a [`crate::runtime::NodeRuntime`] is opened with.
/// The CLI layer is responsible for merging flags, a config file, and
/// defaults into this shape before calling [`crate::runtime::NodeRuntime::open`].
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub node_id: NodeId,
    pub peers: Vec<NodeId>,
    pub data_dir: PathBuf,
    pub initial_primary: bool,
    pub heartbeat_ms: u64,
    pub election_timeout_ms: u64,
    pub election_jitter_pct: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::new(0),
            peers: Vec::new(),
            data_dir: PathBuf::from("./data"),
            initial_primary: false,
            heartbeat_ms: 150,
            election_timeout_ms: 1000,
            election_jitter_pct: 50,
        }
    }
}
