use std::io::Write;
use std::path::{Path, PathBuf};

use kvstore_types::{NodeId, Term};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{MembershipError, MembershipResult};

#[derive(Serialize, Deserialize)]
struct MetaFile {
    node_id: u16,
    current_term: u64,
    voted_for: Option<u16>,
}

/// Persisted `(current_term, voted_for)` at `meta.json`, fsynced before this
/// node ever responds to a VoteRequest (§6, §9: election safety requires
/// this survive a restart even though the source this spec is distilled
/// from did not persist it).
pub struct MetaStore {
    path: PathBuf,
}

impl MetaStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> MembershipResult<(NodeId, Term, Option<NodeId>)> {
        let bytes = std::fs::read(&self.path)?;
        let meta: MetaFile =
            serde_json::from_slice(&bytes).map_err(|e| MembershipError::Serialization(e.to_string()))?;
        Ok((
            NodeId::new(meta.node_id),
            Term::new(meta.current_term),
            meta.voted_for.map(NodeId::new),
        ))
    }

    /// Write `meta.json` atomically (temp file + fsync + rename), matching
    /// the checkpoint write pattern used by the storage engine.
    pub fn save(&self, node_id: NodeId, term: Term, voted_for: Option<NodeId>) -> MembershipResult<()> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir)?;

        let meta = MetaFile {
            node_id: node_id.get(),
            current_term: term.get(),
            voted_for: voted_for.map(NodeId::get),
        };
        let bytes = serde_json::to_vec_pretty(&meta).map_err(|e| MembershipError::Serialization(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| MembershipError::Io(e.error))?;

        info!(node_id = %node_id, term = %term, ?voted_for, "persisted membership meta");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_meta_file_errors() {
        let dir = tempdir().unwrap();
        let store = MetaStore::new(dir.path().join("meta.json"));
        assert!(!store.exists());
        assert!(store.load().is_err());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let store = MetaStore::new(dir.path().join("meta.json"));
        store.save(NodeId::new(1), Term::new(3), Some(NodeId::new(2))).unwrap();

        let (node_id, term, voted_for) = store.load().unwrap();
        assert_eq!(node_id, NodeId::new(1));
        assert_eq!(term, Term::new(3));
        assert_eq!(voted_for, Some(NodeId::new(2)));
    }

    #[test]
    fn save_leaves_no_tmp_file_behind() {
        let dir = tempdir().unwrap();
        let store = MetaStore::new(dir.path().join("meta.json"));
        store.save(NodeId::new(1), Term::zero(), None).unwrap();
        let leftover = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false));
        assert!(!leftover);
    }
}
