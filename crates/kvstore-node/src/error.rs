use kvstore_membership::MembershipError;
use kvstore_replication::ReplicationError;
use kvstore_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("membership error: {0}")]
    Membership(#[from] MembershipError),

    #[error("replication error: {0}")]
    Replication(#[from] ReplicationError),

    #[error("no primary is currently known")]
    Unavailable,
}

pub type NodeResult<T> = Result<T, NodeError>;
