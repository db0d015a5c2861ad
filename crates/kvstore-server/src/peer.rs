use std::net::SocketAddr;

use async_trait::async_trait;
use kvstore_protocol::ReplicationMessage;
use kvstore_replication::{ReplicationError, ReplicationResult};
use kvstore_types::NodeId;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::warn;

use crate::framing::{read_frame, write_frame};

/// A lazily-(re)connecting request/response link to one peer's replication
/// port. Implements [`FollowerLink`] so the same type backs the primary's
/// per-follower sender, the election-timer's vote canvass, and the
/// heartbeat loop's fan-out (§4.3, §4.4) — all three are just "send one
/// replication message, read one reply" over this connection.
pub struct PeerClient {
    node_id: NodeId,
    addr: SocketAddr,
    stream: Mutex<Option<TcpStream>>,
}

impl PeerClient {
    pub fn new(node_id: NodeId, addr: SocketAddr) -> Self {
        Self {
            node_id,
            addr,
            stream: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn transport_error(&self, reason: impl Into<String>) -> ReplicationError {
        ReplicationError::Transport {
            peer: self.node_id,
            reason: reason.into(),
        }
    }

    /// Send `message` and wait for the single reply frame. On any I/O or
    /// framing failure the cached connection is dropped so the next call
    /// reconnects rather than retrying on a half-broken socket.
    pub async fn send(&self, message: ReplicationMessage) -> ReplicationResult<ReplicationMessage> {
        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            let stream = TcpStream::connect(self.addr)
                .await
                .map_err(|e| self.transport_error(e.to_string()))?;
            *guard = Some(stream);
        }

        let result = async {
            let stream = guard.as_mut().expect("just ensured Some");
            write_frame(stream, &message.encode())
                .await
                .map_err(|e| self.transport_error(e.to_string()))?;
            let payload = read_frame(stream)
                .await
                .map_err(|e| self.transport_error(e.to_string()))?
                .ok_or_else(|| self.transport_error("peer closed connection"))?;
            ReplicationMessage::decode(&payload).map_err(|e| self.transport_error(e.to_string()))
        }
        .await;

        if result.is_err() {
            *guard = None;
        }
        result
    }
}

#[async_trait]
impl kvstore_replication::FollowerLink for PeerClient {
    async fn send(&self, message: ReplicationMessage) -> ReplicationResult<ReplicationMessage> {
        let result = PeerClient::send(self, message).await;
        if let Err(ref e) = result {
            warn!(peer = %self.addr, error = %e, "peer link send failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_surfaces_transport_error_when_peer_is_unreachable() {
        // Port 0 never accepts connections; this exercises the connect
        // failure path without needing a live listener.
        let client = PeerClient::new(NodeId::new(9), "127.0.0.1:0".parse().unwrap());
        let err = client
            .send(ReplicationMessage::Heartbeat {
                term: 1,
                leader_id: 0,
                commit_seq: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Transport { peer, .. } if peer == NodeId::new(9)));
    }
}
