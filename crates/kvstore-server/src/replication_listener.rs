use std::sync::Arc;

use kvstore_node::NodeRuntime;
use kvstore_protocol::ReplicationMessage;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::framing::{read_frame, write_frame};

/// Serve one inbound replication connection (§4.3, §4.4): another node's
/// [`PeerClient`](crate::peer::PeerClient) dials in to ship an `Append`,
/// canvass a vote, or emit a heartbeat. Unlike the client protocol this is
/// strictly request/reply per frame — `Heartbeat` has no reply and is
/// simply acknowledged by reading the next frame.
pub async fn serve_replication_connection(node: Arc<NodeRuntime>, mut stream: TcpStream) {
    let peer = stream.peer_addr().ok();
    loop {
        let payload = match read_frame(&mut stream).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(?peer, "replication connection closed");
                return;
            }
            Err(e) => {
                warn!(?peer, error = %e, "replication connection read error");
                return;
            }
        };

        let message = match ReplicationMessage::decode(&payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(?peer, error = %e, "malformed replication message");
                return;
            }
        };

        // Heartbeat carries no reply on the wire; every other message is
        // sent through `FollowerLink::send`, which always waits for one.
        let needs_reply = !matches!(message, ReplicationMessage::Heartbeat { .. });

        let reply = node.handle_replication_message(message).await;
        if needs_reply {
            let Some(reply) = reply else {
                warn!(?peer, "expected a reply for this message but got none");
                return;
            };
            if let Err(e) = write_frame(&mut stream, &reply.encode()).await {
                warn!(?peer, error = %e, "failed to write replication reply");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvstore_node::NodeConfig;
    use kvstore_types::NodeId;
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_round_trips_an_ack() {
        let dir = tempdir().unwrap();
        let node = NodeRuntime::open(NodeConfig {
            node_id: NodeId::new(1),
            peers: vec![NodeId::new(0)],
            data_dir: dir.path().to_path_buf(),
            initial_primary: false,
            ..NodeConfig::default()
        })
        .unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_replication_connection(node, stream).await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let payload = bincode::serialize(&kvstore_storage::WalPayload::Set {
            key: b"a".to_vec(),
            value: b"1".to_vec(),
        })
        .unwrap();
        let msg = ReplicationMessage::Append {
            term: 0,
            seq: 1,
            kind: 0,
            payload,
        };
        crate::framing::write_frame(&mut client, &msg.encode()).await.unwrap();
        let reply = crate::framing::read_frame(&mut client).await.unwrap().unwrap();
        assert_eq!(
            ReplicationMessage::decode(&reply).unwrap(),
            ReplicationMessage::AppendAck {
                term: 0,
                seq: 1,
                ok: true
            }
        );
    }
}
