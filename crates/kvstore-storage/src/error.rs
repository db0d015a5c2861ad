use std::io;

use kvstore_types::Seq;

/// Errors produced by the storage engine.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error during WAL, checkpoint, or metadata operations.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// CRC integrity check failed for a WAL entry.
    #[error("CRC mismatch at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        offset: u64,
        expected: u32,
        actual: u32,
    },

    /// The WAL `seq` sequence had a gap (missing entries between checkpoint and tail).
    #[error("WAL seq gap at offset {offset}: expected {expected}, found {found}")]
    SeqGap {
        offset: u64,
        expected: u64,
        found: u64,
    },

    /// Checkpoint offset is beyond the current WAL write position.
    #[error("checkpoint seq {requested} exceeds last applied seq {current}")]
    InvalidCheckpoint { requested: u64, current: u64 },

    /// The engine has entered the read-only degraded state after an fsync failure.
    #[error("storage is in read-only degraded mode after a prior fsync failure")]
    Degraded,

    /// A replicated entry arrived out of order.
    #[error("out-of-order replicated entry: expected seq {expected}, got {got}")]
    OutOfOrder { expected: Seq, got: Seq },
}

pub type StorageResult<T> = Result<T, StorageError>;
