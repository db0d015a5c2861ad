use std::sync::Arc;

use kvstore_node::NodeRuntime;
use kvstore_protocol::{ClientRequest, ClientResponse, ProtocolError, StatusCode};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::framing::{read_frame, write_frame};

/// Serve one client connection (§4.5): read a frame, decode a
/// [`ClientRequest`], dispatch it to the node, write a [`ClientResponse`]
/// frame, repeat. A malformed frame gets a `MALFORMED` status and the
/// connection is closed (§7); a clean EOF between requests just ends the
/// loop.
pub async fn serve_client_connection(node: Arc<NodeRuntime>, mut stream: TcpStream) {
    let peer = stream.peer_addr().ok();
    loop {
        let payload = match read_frame(&mut stream).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(?peer, "client connection closed");
                return;
            }
            Err(e) => {
                warn!(?peer, error = %e, "client connection read error");
                return;
            }
        };

        let request = match ClientRequest::decode(&payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(?peer, error = %e, "malformed client request");
                let _ = send_malformed(&mut stream).await;
                return;
            }
        };

        let response = node.handle_client_request(request);
        if let Err(e) = write_frame(&mut stream, &response.encode()).await {
            warn!(?peer, error = %e, "failed to write client response");
            return;
        }
    }
}

async fn send_malformed(stream: &mut TcpStream) -> Result<(), ProtocolError> {
    let response = ClientResponse::Status {
        code: StatusCode::Malformed,
        leader_hint: None,
    };
    write_frame(stream, &response.encode())
        .await
        .map_err(|_| ProtocolError::Malformed("failed to send MALFORMED response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvstore_node::NodeConfig;
    use kvstore_types::NodeId;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    async fn spawn_primary(dir: &std::path::Path) -> Arc<NodeRuntime> {
        NodeRuntime::open(NodeConfig {
            node_id: NodeId::new(0),
            initial_primary: true,
            data_dir: dir.to_path_buf(),
            ..NodeConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn set_then_get_over_the_wire() {
        let dir = tempdir().unwrap();
        let node = spawn_primary(dir.path()).await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let node_clone = node.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_client_connection(node_clone, stream).await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let set_req = ClientRequest::Set {
            key: b"a".to_vec(),
            value: b"1".to_vec(),
        };
        write_frame(&mut client, &set_req.encode()).await.unwrap();
        let reply = read_frame(&mut client).await.unwrap().unwrap();
        assert_eq!(
            ClientResponse::decode(&reply).unwrap(),
            ClientResponse::Status {
                code: StatusCode::Ok,
                leader_hint: None
            }
        );

        let get_req = ClientRequest::Get { key: b"a".to_vec() };
        write_frame(&mut client, &get_req.encode()).await.unwrap();
        let reply = read_frame(&mut client).await.unwrap().unwrap();
        assert_eq!(
            ClientResponse::decode(&reply).unwrap(),
            ClientResponse::Value {
                value: Some(b"1".to_vec())
            }
        );

        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_frame_gets_malformed_status_and_connection_closes() {
        let dir = tempdir().unwrap();
        let node = spawn_primary(dir.path()).await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_client_connection(node, stream).await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut client, &[0xEE]).await.unwrap();
        let reply = read_frame(&mut client).await.unwrap().unwrap();
        assert_eq!(
            ClientResponse::decode(&reply).unwrap(),
            ClientResponse::Status {
                code: StatusCode::Malformed,
                leader_hint: None
            }
        );
    }
}
