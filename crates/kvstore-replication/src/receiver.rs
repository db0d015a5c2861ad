use kvstore_storage::{FileStorageEngine, StorageError, WalPayload};
use kvstore_types::Seq;
use tracing::warn;

use crate::error::{ReplicationError, ReplicationResult};

/// Follower-side apply of one primary-shipped entry (§4.3): decode the WAL
/// payload and hand it to the storage engine's strict-ordering apply path.
/// A gap or out-of-order `seq` surfaces as [`ReplicationError::Storage`]
/// wrapping [`StorageError::OutOfOrder`]; the caller should treat that as a
/// signal to request a snapshot resync rather than retry the same entry.
pub async fn apply_append(
    engine: &FileStorageEngine,
    seq: Seq,
    payload_bytes: &[u8],
) -> ReplicationResult<()> {
    let payload: WalPayload = bincode::deserialize(payload_bytes)
        .map_err(|e| ReplicationError::Storage(StorageError::Serialization(e.to_string())))?;
    engine.apply_replicated(seq, payload)?;
    Ok(())
}

/// True if `err` indicates the follower has fallen out of sequence with
/// the primary and needs a snapshot resync.
pub fn indicates_resync(err: &ReplicationError) -> bool {
    match err {
        ReplicationError::Storage(StorageError::OutOfOrder { .. }) => true,
        ReplicationError::QueueOverflow(_) => true,
        _ => false,
    }
}

pub fn log_apply_failure(follower_seq: Seq, err: &ReplicationError) {
    warn!(seq = follower_seq.get(), error = %err, "replicated apply failed");
}
