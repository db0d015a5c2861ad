use std::collections::BTreeMap;

use kvstore_types::{NodeId, Role, Seq, Term};
use serde::Serialize;

/// Snapshot of node state for the `/status` observability endpoint (§10.3).
/// Peer lag is only meaningful while this node is primary; it is empty on a
/// follower, which has no downstream peers of its own.
#[derive(Clone, Debug, Serialize)]
pub struct NodeStatus {
    pub node_id: u16,
    pub role: String,
    pub term: u64,
    pub last_applied_seq: u64,
    pub peer_lag: BTreeMap<u16, u64>,
}

impl NodeStatus {
    pub fn new(
        node_id: NodeId,
        role: Role,
        term: Term,
        last_applied_seq: Seq,
        acked: impl IntoIterator<Item = (NodeId, u64)>,
    ) -> Self {
        let peer_lag = acked
            .into_iter()
            .map(|(peer, acked_seq)| (peer.get(), last_applied_seq.get().saturating_sub(acked_seq)))
            .collect();
        Self {
            node_id: node_id.get(),
            role: role.to_string(),
            term: term.get(),
            last_applied_seq: last_applied_seq.get(),
            peer_lag,
        }
    }
}
