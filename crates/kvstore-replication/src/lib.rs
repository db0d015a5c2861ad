//! Primary-directed log shipping (§4.3): a `MutationObserver` that fans
//! out applied entries to per-follower bounded queues, background sender
//! loops with backoff, follower-side ordered apply, and snapshot resync
//! encoding for followers that fall out of sequence.

pub mod error;
pub mod queue;
pub mod receiver;
pub mod sender;
pub mod snapshot;
pub mod transport;

pub use error::{ReplicationError, ReplicationResult};
pub use queue::{QueuedEntry, DEFAULT_QUEUE_CAPACITY};
pub use receiver::{apply_append, indicates_resync, log_apply_failure};
pub use sender::{run_follower_sender, PrimaryReplicator};
pub use snapshot::{chunk_bytes, decode_snapshot, encode_snapshot, SNAPSHOT_CHUNK_SIZE};
pub use transport::FollowerLink;
