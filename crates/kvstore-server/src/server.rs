use std::collections::BTreeMap;
use std::sync::Arc;

use kvstore_node::NodeRuntime;
use kvstore_protocol::ReplicationMessage;
use kvstore_types::NodeId;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::client::serve_client_connection;
use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::metrics;
use crate::peer::PeerClient;
use crate::replication_listener::serve_replication_connection;

/// A running node process: the client and replication listeners, the
/// background heartbeat/election timers, the per-peer replication senders,
/// and (optionally) the metrics endpoint — everything §2's layering diagram
/// calls "wire server" plus the membership/replication driving loops that
/// glue it to [`NodeRuntime`].
pub struct KvServer {
    config: ServerConfig,
    node: Arc<NodeRuntime>,
    peers: Arc<BTreeMap<NodeId, Arc<PeerClient>>>,
}

impl KvServer {
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let node = NodeRuntime::open(config.node.clone())?;
        let peers: BTreeMap<NodeId, Arc<PeerClient>> = config
            .peer_addrs
            .iter()
            .map(|(id, addr)| (*id, Arc::new(PeerClient::new(*id, *addr))))
            .collect();

        for (id, link) in &peers {
            node.register_follower_link(*id, link.clone());
        }

        Ok(Self {
            config,
            node,
            peers: Arc::new(peers),
        })
    }

    pub fn node(&self) -> &Arc<NodeRuntime> {
        &self.node
    }

    /// Run until one of the listeners fails or the process is signaled to
    /// stop. Spawns the client listener, replication listener, heartbeat
    /// timer, election timer, and (if configured) the metrics HTTP server
    /// as independent tasks and waits on all of them.
    pub async fn serve(self) -> ServerResult<()> {
        let client_listener = TcpListener::bind(self.config.client_addr).await?;
        let replication_listener = TcpListener::bind(self.config.replication_addr).await?;
        info!(
            node_id = %self.node.node_id(),
            client_addr = %self.config.client_addr,
            replication_addr = %self.config.replication_addr,
            "node listening"
        );

        let mut tasks = Vec::new();

        let node = self.node.clone();
        tasks.push(tokio::spawn(async move {
            accept_loop(client_listener, node, serve_client_connection).await
        }));

        let node = self.node.clone();
        tasks.push(tokio::spawn(async move {
            accept_loop(replication_listener, node, serve_replication_connection).await
        }));

        let peers_for_heartbeat = self.peers.clone();
        let node = self.node.clone();
        tasks.push(tokio::spawn(async move {
            node.run_heartbeat_loop(move |peer, message| {
                let peers = peers_for_heartbeat.clone();
                async move {
                    if let Some(link) = peers.get(&peer) {
                        let _ = link.send(message).await;
                    }
                }
            })
            .await;
        }));

        let peers_for_election = self.peers.clone();
        let node = self.node.clone();
        tasks.push(tokio::spawn(async move {
            node.run_election_timer(move |peer: NodeId, message: ReplicationMessage| {
                let peers = peers_for_election.clone();
                async move {
                    match peers.get(&peer) {
                        Some(link) => link.send(message).await.ok(),
                        None => None,
                    }
                }
            })
            .await;
        }));

        if let Some(metrics_addr) = self.config.metrics_addr {
            let node = self.node.clone();
            tasks.push(tokio::spawn(async move {
                let app = metrics::build_router(node);
                match TcpListener::bind(metrics_addr).await {
                    Ok(listener) => {
                        if let Err(e) = axum::serve(listener, app).await {
                            warn!(error = %e, "metrics endpoint stopped");
                        }
                    }
                    Err(e) => warn!(%metrics_addr, error = %e, "failed to bind metrics endpoint"),
                }
            }));
        }

        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }
}

async fn accept_loop<F, Fut>(listener: TcpListener, node: Arc<NodeRuntime>, handler: F)
where
    F: Fn(Arc<NodeRuntime>, tokio::net::TcpStream) -> Fut + Send + Sync + 'static + Copy,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let node = node.clone();
                tokio::spawn(async move {
                    tracing::debug!(%addr, "connection accepted");
                    handler(node, stream).await;
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}
