//! Durable, crash-recoverable key-value storage: write-ahead log,
//! checkpointing, and the write-gated engine that ties them to an in-memory
//! map.

pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod mutation;
pub mod wal;

pub use checkpoint::CheckpointStore;
pub use engine::{FileStorageEngine, MutationObserver, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use mutation::{Applied, Mutation, WalPayload};
pub use wal::{SyncMode, WalRecord, WriteAheadLog};
