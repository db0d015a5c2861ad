use kvstore_node::NodeError;
use kvstore_protocol::ProtocolError;
use kvstore_replication::ReplicationError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("node error: {0}")]
    Node(#[from] NodeError),

    #[error("replication error: {0}")]
    Replication(#[from] ReplicationError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type ServerResult<T> = Result<T, ServerError>;
