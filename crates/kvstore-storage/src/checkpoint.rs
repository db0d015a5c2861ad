use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use kvstore_types::{Key, Seq, Value};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{StorageError, StorageResult};

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    seq: u64,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

/// Writes and loads checkpoint snapshots: a complete copy of the store state
/// plus the `seq` of the last WAL entry it incorporates, written atomically
/// via temporary-file-then-rename (§4.1).
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Atomically write a snapshot: the data is serialized to a temp file in
    /// the same directory, fsynced, then renamed over the final path so a
    /// crash mid-write never leaves a partial `checkpoint.snap`.
    pub fn write(&self, seq: Seq, state: &HashMap<Key, Value>) -> StorageResult<()> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir)?;

        let entries = state
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect();
        let snapshot = SnapshotFile {
            seq: seq.get(),
            entries,
        };
        let bytes = bincode::serialize(&snapshot)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            writer.write_all(&bytes)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::Io(e.error))?;

        info!(seq = seq.get(), keys = state.len(), "checkpoint written");
        Ok(())
    }

    /// Load the snapshot, returning the recovered state and the `seq` it
    /// incorporates. Returns an empty state at `seq = 0` if no checkpoint
    /// exists yet (fresh node).
    pub fn load(&self) -> StorageResult<(HashMap<Key, Value>, Seq)> {
        if !self.path.exists() {
            return Ok((HashMap::new(), Seq::zero()));
        }
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let snapshot: SnapshotFile =
            bincode::deserialize(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let state = snapshot
            .entries
            .into_iter()
            .map(|(k, v)| (Key::from(k), Value::from(v)))
            .collect();
        Ok((state, Seq(snapshot.seq)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_checkpoint_yields_empty_state() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.snap"));
        let (state, seq) = store.load().unwrap();
        assert!(state.is_empty());
        assert_eq!(seq, Seq::zero());
    }

    #[test]
    fn write_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.snap"));

        let mut state = HashMap::new();
        state.insert(Key::from("a"), Value::from("1"));
        state.insert(Key::from("b"), Value::from("2"));

        store.write(Seq(5), &state).unwrap();
        assert!(store.exists());

        let (loaded, seq) = store.load().unwrap();
        assert_eq!(seq, Seq(5));
        assert_eq!(loaded.get(&Key::from("a")), Some(&Value::from("1")));
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn write_is_atomic_no_tmp_left_behind() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.snap"));
        store.write(Seq(1), &HashMap::new()).unwrap();
        let leftover_tmp = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false));
        assert!(!leftover_tmp);
    }
}
