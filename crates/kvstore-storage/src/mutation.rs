use kvstore_types::{Key, Seq, Value};
use serde::{Deserialize, Serialize};

/// A mutation requested by a caller, before a `seq` has been assigned.
#[derive(Clone, Debug)]
pub enum Mutation {
    Set { key: Key, value: Value },
    Delete { key: Key },
    BulkSet { pairs: Vec<(Key, Value)> },
}

/// The on-disk payload of a single WAL entry. Distinct from [`Mutation`]
/// because it is what actually gets framed, checksummed, and persisted; a
/// [`Mutation`] becomes a `WalPayload` once it is assigned a `seq`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WalPayload {
    Set { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
    BulkSet { pairs: Vec<(Vec<u8>, Vec<u8>)> },
    Checkpoint { snapshot_seq: u64 },
}

impl WalPayload {
    /// The `kind` byte written into the WAL frame header (§4.1 of the spec).
    pub fn kind_byte(&self) -> u8 {
        match self {
            WalPayload::Set { .. } => 1,
            WalPayload::Delete { .. } => 2,
            WalPayload::BulkSet { .. } => 3,
            WalPayload::Checkpoint { .. } => 4,
        }
    }

    pub fn from_mutation(mutation: &Mutation) -> Self {
        match mutation {
            Mutation::Set { key, value } => WalPayload::Set {
                key: key.as_bytes().to_vec(),
                value: value.as_bytes().to_vec(),
            },
            Mutation::Delete { key } => WalPayload::Delete {
                key: key.as_bytes().to_vec(),
            },
            Mutation::BulkSet { pairs } => WalPayload::BulkSet {
                pairs: pairs
                    .iter()
                    .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
                    .collect(),
            },
        }
    }
}

/// The effect of a mutation that has been durably applied, handed to every
/// registered [`crate::engine::MutationObserver`] under the write gate.
///
/// Each variant carries the prior value(s) so observers (notably the index
/// manager) can retract stale postings for an overwritten or deleted key
/// without a second lookup.
#[derive(Clone, Debug)]
pub enum Applied {
    Set {
        seq: Seq,
        key: Key,
        new: Value,
        old: Option<Value>,
    },
    Delete {
        seq: Seq,
        key: Key,
        old: Option<Value>,
    },
    BulkSet {
        seq: Seq,
        /// (key, new value, previous value if any)
        pairs: Vec<(Key, Value, Option<Value>)>,
    },
}

impl Applied {
    pub fn seq(&self) -> Seq {
        match self {
            Applied::Set { seq, .. } => *seq,
            Applied::Delete { seq, .. } => *seq,
            Applied::BulkSet { seq, .. } => *seq,
        }
    }
}
