use kvstore_protocol::ProtocolError;
use kvstore_storage::StorageError;
use kvstore_types::{NodeId, Seq};

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport error reaching {peer}: {reason}")]
    Transport { peer: NodeId, reason: String },

    #[error("follower {0} send queue overflowed; forcing snapshot resync")]
    QueueOverflow(NodeId),

    #[error("out-of-order replicated entry: expected {expected}, got {got}")]
    OutOfOrder { expected: Seq, got: Seq },

    #[error("replication channel closed")]
    ChannelClosed,
}

pub type ReplicationResult<T> = Result<T, ReplicationError>;
