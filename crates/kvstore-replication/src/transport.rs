use async_trait::async_trait;
use kvstore_protocol::ReplicationMessage;

use crate::error::ReplicationResult;

/// A request/response link to one peer's replication port. The concrete
/// implementation (a TCP connection, owned by `kvstore-server`) is injected
/// here so the sender/receiver logic in this crate stays transport-agnostic
/// and independently testable.
#[async_trait]
pub trait FollowerLink: Send + Sync {
    async fn send(&self, message: ReplicationMessage) -> ReplicationResult<ReplicationMessage>;
}
