use std::collections::HashMap;

use kvstore_types::{Key, Value};

use crate::error::{ReplicationError, ReplicationResult};

/// Chunk size used when streaming a snapshot over `SNAPSHOT_CHUNK` messages
/// (§6). Arbitrary but kept well under the protocol's message size ceiling.
pub const SNAPSHOT_CHUNK_SIZE: usize = 64 * 1024;

/// Serialize a store snapshot for streaming to a resyncing follower.
pub fn encode_snapshot(state: &HashMap<Key, Value>) -> ReplicationResult<Vec<u8>> {
    let entries: Vec<(Vec<u8>, Vec<u8>)> = state
        .iter()
        .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
        .collect();
    bincode::serialize(&entries)
        .map_err(|e| ReplicationError::Storage(kvstore_storage::StorageError::Serialization(e.to_string())))
}

pub fn decode_snapshot(bytes: &[u8]) -> ReplicationResult<HashMap<Key, Value>> {
    let entries: Vec<(Vec<u8>, Vec<u8>)> = bincode::deserialize(bytes)
        .map_err(|e| ReplicationError::Storage(kvstore_storage::StorageError::Serialization(e.to_string())))?;
    Ok(entries.into_iter().map(|(k, v)| (Key::from(k), Value::from(v))).collect())
}

/// Split an encoded snapshot into `SNAPSHOT_CHUNK_SIZE`-byte pieces for
/// `SnapshotChunk` messages. The final chunk may be shorter.
pub fn chunk_bytes(bytes: &[u8]) -> Vec<Vec<u8>> {
    if bytes.is_empty() {
        return vec![Vec::new()];
    }
    bytes.chunks(SNAPSHOT_CHUNK_SIZE).map(<[u8]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_roundtrips_through_encode_decode() {
        let mut state = HashMap::new();
        state.insert(Key::from("a"), Value::from("1"));
        state.insert(Key::from("b"), Value::from("2"));

        let bytes = encode_snapshot(&state).unwrap();
        let decoded = decode_snapshot(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.get(&Key::from("a")), Some(&Value::from("1")));
    }

    #[test]
    fn chunk_bytes_reassembles_to_original() {
        let bytes = vec![7u8; SNAPSHOT_CHUNK_SIZE * 2 + 10];
        let chunks = chunk_bytes(&bytes);
        assert_eq!(chunks.len(), 3);
        let reassembled: Vec<u8> = chunks.into_iter().flatten().collect();
        assert_eq!(reassembled, bytes);
    }
}
