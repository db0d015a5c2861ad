//! Wire server for one node (§4.5, §10.3): client and replication TCP
//! listeners, a peer transport for replication/heartbeat/election
//! messages, and the `/healthz` + `/status` observability endpoint.
//! Everything below this crate (`kvstore-node` and its dependencies) is
//! transport-agnostic; this is where bytes actually go on the wire.

pub mod client;
pub mod config;
pub mod error;
pub mod framing;
pub mod metrics;
pub mod peer;
pub mod replication_listener;
pub mod server;

pub use config::{replication_port_for, ServerConfig, REPLICATION_PORT_OFFSET};
pub use error::{ServerError, ServerResult};
pub use peer::PeerClient;
pub use server::KvServer;
