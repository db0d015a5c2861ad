use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use kvstore_types::{Key, Seq, Value};
use tracing::{error, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::error::{StorageError, StorageResult};
use crate::mutation::{Applied, WalPayload};
use crate::wal::{SyncMode, WriteAheadLog};

/// Observes mutations applied by the storage engine under the write gate.
/// The index manager and the replication sender both implement this trait;
/// the storage engine itself is oblivious to what observers do with the
/// notification.
pub trait MutationObserver: Send + Sync {
    fn on_apply(&self, applied: &Applied);
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub sync_mode: SyncMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::EveryWrite,
        }
    }
}

/// The write gate: every mutating operation holds this lock for its full
/// duration (WAL append, in-memory apply, observer notification), which is
/// what makes BULKSET atomic with respect to readers and keeps WAL `seq`
/// values contiguous. Readers never take this lock.
struct WriteGate {
    wal: WriteAheadLog,
    last_seq: Seq,
}

/// File-backed storage engine: in-memory map fronted by a write-ahead log,
/// checkpointing, and crash recovery (§4.1).
pub struct FileStorageEngine {
    data_dir: PathBuf,
    state: RwLock<HashMap<Key, Value>>,
    gate: Mutex<WriteGate>,
    checkpoint_store: CheckpointStore,
    observers: RwLock<Vec<Arc<dyn MutationObserver>>>,
    degraded: AtomicBool,
}

impl FileStorageEngine {
    /// Open the engine rooted at `data_dir`, recovering from the most
    /// recent checkpoint plus any well-formed WAL tail (§4.1 recovery
    /// algorithm, steps 1-4; step 5, rebuilding the indexes, is the caller's
    /// responsibility once it has constructed the index manager and can
    /// register it as an observer).
    pub fn open(data_dir: impl Into<PathBuf>, config: StorageConfig) -> StorageResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        let checkpoint_store = CheckpointStore::new(data_dir.join("checkpoint.snap"));
        let (mut state, checkpoint_seq) = checkpoint_store.load()?;

        let wal_path = data_dir.join("wal.log");
        let (wal, records) =
            WriteAheadLog::open(&wal_path, config.sync_mode, checkpoint_seq.get() + 1)?;

        let mut last_seq = checkpoint_seq;
        for record in &records {
            apply_payload_to_map(&mut state, &record.payload);
            last_seq = Seq(record.seq);
        }

        info!(
            data_dir = %data_dir.display(),
            recovered_entries = records.len(),
            last_seq = last_seq.get(),
            keys = state.len(),
            "storage engine recovered"
        );

        Ok(Self {
            data_dir,
            state: RwLock::new(state),
            gate: Mutex::new(WriteGate { wal, last_seq }),
            checkpoint_store,
            observers: RwLock::new(Vec::new()),
            degraded: AtomicBool::new(false),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn register_observer(&self, observer: Arc<dyn MutationObserver>) {
        self.observers.write().expect("observers lock poisoned").push(observer);
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn last_applied_seq(&self) -> Seq {
        self.gate.lock().expect("write gate poisoned").last_seq
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.is_degraded() {
            return Err(StorageError::Degraded);
        }
        Ok(())
    }

    fn notify(&self, applied: &Applied) {
        let observers = self.observers.read().expect("observers lock poisoned");
        for observer in observers.iter() {
            observer.on_apply(applied);
        }
    }

    /// Mark the engine read-only after an unrecoverable WAL I/O failure
    /// (§7: "If fsync itself fails, the node transitions to a read-only
    /// degraded state and refuses further writes until restart").
    fn degrade(&self, err: &StorageError) {
        error!(error = %err, "storage engine entering degraded mode after WAL failure");
        self.degraded.store(true, Ordering::Release);
    }

    pub fn get(&self, key: &Key) -> Option<Value> {
        self.state.read().expect("state lock poisoned").get(key).cloned()
    }

    pub fn set(&self, key: Key, value: Value) -> StorageResult<()> {
        self.check_writable()?;
        let mut gate = self.gate.lock().expect("write gate poisoned");
        let seq = gate.last_seq.next();
        let payload = WalPayload::Set {
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
        };
        if let Err(e) = gate.wal.append(seq.get(), &payload) {
            self.degrade(&e);
            return Err(e);
        }
        let old = {
            let mut state = self.state.write().expect("state lock poisoned");
            state.insert(key.clone(), value.clone())
        };
        gate.last_seq = seq;
        drop(gate);
        self.notify(&Applied::Set {
            seq,
            key,
            new: value,
            old,
        });
        Ok(())
    }

    pub fn delete(&self, key: &Key) -> StorageResult<bool> {
        self.check_writable()?;
        let mut gate = self.gate.lock().expect("write gate poisoned");
        let seq = gate.last_seq.next();
        let payload = WalPayload::Delete {
            key: key.as_bytes().to_vec(),
        };
        // Always write the entry, even if the key is absent, so followers
        // observe intent uniformly (§9 open question, resolved: yes).
        if let Err(e) = gate.wal.append(seq.get(), &payload) {
            self.degrade(&e);
            return Err(e);
        }
        let old = {
            let mut state = self.state.write().expect("state lock poisoned");
            state.remove(key)
        };
        gate.last_seq = seq;
        drop(gate);
        let existed = old.is_some();
        self.notify(&Applied::Delete {
            seq,
            key: key.clone(),
            old,
        });
        Ok(existed)
    }

    /// Apply a batch as a single WAL entry and a single observable step.
    /// Either every pair is applied or none is.
    pub fn bulk_set(&self, pairs: Vec<(Key, Value)>) -> StorageResult<()> {
        self.check_writable()?;
        let mut gate = self.gate.lock().expect("write gate poisoned");
        let seq = gate.last_seq.next();
        let payload = WalPayload::BulkSet {
            pairs: pairs
                .iter()
                .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
                .collect(),
        };
        if let Err(e) = gate.wal.append(seq.get(), &payload) {
            self.degrade(&e);
            return Err(e);
        }
        let applied_pairs = {
            let mut state = self.state.write().expect("state lock poisoned");
            pairs
                .into_iter()
                .map(|(k, v)| {
                    let old = state.insert(k.clone(), v.clone());
                    (k, v, old)
                })
                .collect::<Vec<_>>()
        };
        gate.last_seq = seq;
        drop(gate);
        self.notify(&Applied::BulkSet {
            seq,
            pairs: applied_pairs,
        });
        Ok(())
    }

    /// Flush a snapshot of `S`, record a CHECKPOINT marker, and truncate the
    /// WAL prefix covered by the snapshot (§4.1).
    pub fn checkpoint(&self) -> StorageResult<()> {
        self.check_writable()?;
        let mut gate = self.gate.lock().expect("write gate poisoned");
        let snapshot_seq = gate.last_seq;
        let state_copy = self.state.read().expect("state lock poisoned").clone();

        self.checkpoint_store.write(snapshot_seq, &state_copy)?;

        if let Err(e) = gate.wal.truncate_all() {
            self.degrade(&e);
            return Err(e);
        }

        let marker_seq = snapshot_seq.next();
        let payload = WalPayload::Checkpoint {
            snapshot_seq: snapshot_seq.get(),
        };
        if let Err(e) = gate.wal.append(marker_seq.get(), &payload) {
            self.degrade(&e);
            return Err(e);
        }
        gate.last_seq = marker_seq;
        Ok(())
    }

    /// Apply a mutation already assigned `seq` by the primary (follower
    /// replication path). Validates strict ordering, appends locally, and
    /// applies under the same write gate as local writes.
    pub fn apply_replicated(&self, seq: Seq, payload: WalPayload) -> StorageResult<()> {
        self.check_writable()?;
        let mut gate = self.gate.lock().expect("write gate poisoned");
        let expected = gate.last_seq.next();
        if seq != expected {
            return Err(StorageError::OutOfOrder {
                expected,
                got: seq,
            });
        }
        if let Err(e) = gate.wal.append(seq.get(), &payload) {
            self.degrade(&e);
            return Err(e);
        }
        let applied = {
            let mut state = self.state.write().expect("state lock poisoned");
            apply_payload_with_trace(&mut state, seq, &payload)
        };
        gate.last_seq = seq;
        drop(gate);
        if let Some(applied) = applied {
            self.notify(&applied);
        }
        Ok(())
    }

    /// Snapshot the current state, for checkpointing or for serving a
    /// snapshot-resync request to a lagging follower.
    pub fn snapshot_state(&self) -> (HashMap<Key, Value>, Seq) {
        let gate = self.gate.lock().expect("write gate poisoned");
        let state = self.state.read().expect("state lock poisoned").clone();
        (state, gate.last_seq)
    }

    /// Atomically replace the entire store state (follower snapshot resync,
    /// §4.3): wipe the WAL, write a fresh checkpoint at `seq`, and swap `S`.
    pub fn replace_state(&self, state: HashMap<Key, Value>, seq: Seq) -> StorageResult<()> {
        let mut gate = self.gate.lock().expect("write gate poisoned");
        self.checkpoint_store.write(seq, &state)?;
        if let Err(e) = gate.wal.truncate_all() {
            self.degrade(&e);
            return Err(e);
        }
        *self.state.write().expect("state lock poisoned") = state;
        gate.last_seq = seq;
        warn!(seq = seq.get(), "storage state replaced via snapshot resync");
        Ok(())
    }
}

fn apply_payload_to_map(state: &mut HashMap<Key, Value>, payload: &WalPayload) {
    match payload {
        WalPayload::Set { key, value } => {
            state.insert(Key::from(key.clone()), Value::from(value.clone()));
        }
        WalPayload::Delete { key } => {
            state.remove(&Key::from(key.clone()));
        }
        WalPayload::BulkSet { pairs } => {
            for (k, v) in pairs {
                state.insert(Key::from(k.clone()), Value::from(v.clone()));
            }
        }
        WalPayload::Checkpoint { .. } => {}
    }
}

fn apply_payload_with_trace(
    state: &mut HashMap<Key, Value>,
    seq: Seq,
    payload: &WalPayload,
) -> Option<Applied> {
    match payload {
        WalPayload::Set { key, value } => {
            let key = Key::from(key.clone());
            let value = Value::from(value.clone());
            let old = state.insert(key.clone(), value.clone());
            Some(Applied::Set {
                seq,
                key,
                new: value,
                old,
            })
        }
        WalPayload::Delete { key } => {
            let key = Key::from(key.clone());
            let old = state.remove(&key);
            Some(Applied::Delete { seq, key, old })
        }
        WalPayload::BulkSet { pairs } => {
            let applied = pairs
                .iter()
                .map(|(k, v)| {
                    let key = Key::from(k.clone());
                    let value = Value::from(v.clone());
                    let old = state.insert(key.clone(), value.clone());
                    (key, value, old)
                })
                .collect();
            Some(Applied::BulkSet { seq, pairs: applied })
        }
        WalPayload::Checkpoint { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    struct RecordingObserver {
        events: StdMutex<Vec<Applied>>,
    }

    impl RecordingObserver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: StdMutex::new(Vec::new()),
            })
        }
    }

    impl MutationObserver for RecordingObserver {
        fn on_apply(&self, applied: &Applied) {
            self.events.lock().unwrap().push(applied.clone());
        }
    }

    #[test]
    fn set_then_get_returns_value() {
        let dir = tempdir().unwrap();
        let engine = FileStorageEngine::open(dir.path(), StorageConfig::default()).unwrap();
        engine.set(Key::from("a"), Value::from("1")).unwrap();
        assert_eq!(engine.get(&Key::from("a")), Some(Value::from("1")));
    }

    #[test]
    fn delete_removes_key_and_reports_existed() {
        let dir = tempdir().unwrap();
        let engine = FileStorageEngine::open(dir.path(), StorageConfig::default()).unwrap();
        engine.set(Key::from("a"), Value::from("1")).unwrap();
        assert!(engine.delete(&Key::from("a")).unwrap());
        assert_eq!(engine.get(&Key::from("a")), None);
        assert!(!engine.delete(&Key::from("a")).unwrap());
    }

    #[test]
    fn overwrite_reports_old_value_to_observers() {
        let dir = tempdir().unwrap();
        let engine = FileStorageEngine::open(dir.path(), StorageConfig::default()).unwrap();
        let observer = RecordingObserver::new();
        engine.register_observer(observer.clone());

        engine.set(Key::from("a"), Value::from("1")).unwrap();
        engine.set(Key::from("a"), Value::from("2")).unwrap();

        let events = observer.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        match &events[1] {
            Applied::Set { old, new, .. } => {
                assert_eq!(*old, Some(Value::from("1")));
                assert_eq!(*new, Value::from("2"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn bulk_set_applies_all_pairs_atomically() {
        let dir = tempdir().unwrap();
        let engine = FileStorageEngine::open(dir.path(), StorageConfig::default()).unwrap();
        engine
            .bulk_set(vec![
                (Key::from("x"), Value::from("10")),
                (Key::from("y"), Value::from("20")),
                (Key::from("z"), Value::from("30")),
            ])
            .unwrap();
        assert_eq!(engine.get(&Key::from("x")), Some(Value::from("10")));
        assert_eq!(engine.get(&Key::from("y")), Some(Value::from("20")));
        assert_eq!(engine.get(&Key::from("z")), Some(Value::from("30")));
    }

    #[test]
    fn recovery_replays_wal_after_restart() {
        let dir = tempdir().unwrap();
        {
            let engine = FileStorageEngine::open(dir.path(), StorageConfig::default()).unwrap();
            engine.set(Key::from("a"), Value::from("1")).unwrap();
            engine.set(Key::from("b"), Value::from("2")).unwrap();
        }
        let engine = FileStorageEngine::open(dir.path(), StorageConfig::default()).unwrap();
        assert_eq!(engine.get(&Key::from("a")), Some(Value::from("1")));
        assert_eq!(engine.get(&Key::from("b")), Some(Value::from("2")));
        assert_eq!(engine.last_applied_seq(), Seq(2));
    }

    #[test]
    fn checkpoint_then_recovery_yields_same_state() {
        let dir = tempdir().unwrap();
        {
            let engine = FileStorageEngine::open(dir.path(), StorageConfig::default()).unwrap();
            engine.set(Key::from("a"), Value::from("1")).unwrap();
            engine.checkpoint().unwrap();
            engine.set(Key::from("b"), Value::from("2")).unwrap();
        }
        let engine = FileStorageEngine::open(dir.path(), StorageConfig::default()).unwrap();
        assert_eq!(engine.get(&Key::from("a")), Some(Value::from("1")));
        assert_eq!(engine.get(&Key::from("b")), Some(Value::from("2")));
    }

    #[test]
    fn seq_is_contiguous_across_mutation_kinds() {
        let dir = tempdir().unwrap();
        let engine = FileStorageEngine::open(dir.path(), StorageConfig::default()).unwrap();
        engine.set(Key::from("a"), Value::from("1")).unwrap();
        engine.delete(&Key::from("a")).unwrap();
        engine
            .bulk_set(vec![(Key::from("b"), Value::from("2"))])
            .unwrap();
        assert_eq!(engine.last_applied_seq(), Seq(3));
    }

    #[test]
    fn apply_replicated_rejects_out_of_order_seq() {
        let dir = tempdir().unwrap();
        let engine = FileStorageEngine::open(dir.path(), StorageConfig::default()).unwrap();
        let payload = WalPayload::Set {
            key: b"a".to_vec(),
            value: b"1".to_vec(),
        };
        let err = engine.apply_replicated(Seq(5), payload).unwrap_err();
        assert!(matches!(err, StorageError::OutOfOrder { .. }));
    }

    #[test]
    fn replace_state_swaps_store_and_resets_wal() {
        let dir = tempdir().unwrap();
        let engine = FileStorageEngine::open(dir.path(), StorageConfig::default()).unwrap();
        engine.set(Key::from("stale"), Value::from("x")).unwrap();

        let mut fresh = HashMap::new();
        fresh.insert(Key::from("fresh"), Value::from("y"));
        engine.replace_state(fresh, Seq(42)).unwrap();

        assert_eq!(engine.get(&Key::from("stale")), None);
        assert_eq!(engine.get(&Key::from("fresh")), Some(Value::from("y")));
        assert_eq!(engine.last_applied_seq(), Seq(42));
    }

    proptest::proptest! {
        // §8 invariant 4: recovery equivalence. Whatever sequence of
        // set/delete/checkpoint operations an engine is driven through, a
        // fresh `open()` of the same data directory reconstructs exactly
        // the same key/value state, regardless of where a checkpoint fell
        // in the sequence.
        #[test]
        fn recovered_state_matches_pre_restart_state(
            ops in proptest::collection::vec(engine_op(), 1..30),
        ) {
            let dir = tempdir().unwrap();
            let mut model: HashMap<Key, Value> = HashMap::new();
            {
                let engine = FileStorageEngine::open(dir.path(), StorageConfig::default()).unwrap();
                for op in ops {
                    match op {
                        EngineOp::Set(k, v) => {
                            let key = Key::from(k);
                            let value = Value::from(v);
                            engine.set(key.clone(), value.clone()).unwrap();
                            model.insert(key, value);
                        }
                        EngineOp::Delete(k) => {
                            let key = Key::from(k);
                            engine.delete(&key).unwrap();
                            model.remove(&key);
                        }
                        EngineOp::Checkpoint => {
                            engine.checkpoint().unwrap();
                        }
                    }
                }
            }

            let engine = FileStorageEngine::open(dir.path(), StorageConfig::default()).unwrap();
            for (key, value) in &model {
                prop_assert_eq!(engine.get(key), Some(value.clone()));
            }
            let (recovered, _seq) = engine.snapshot_state();
            prop_assert_eq!(recovered.len(), model.len());
        }
    }

    #[derive(Clone, Debug)]
    enum EngineOp {
        Set(String, String),
        Delete(String),
        Checkpoint,
    }

    fn engine_op() -> impl proptest::strategy::Strategy<Value = EngineOp> {
        use proptest::prelude::*;
        let key = prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(String::from);
        let value = prop::sample::select(vec!["1", "2", "3"]).prop_map(String::from);
        prop_oneof![
            3 => (key.clone(), value).prop_map(|(k, v)| EngineOp::Set(k, v)),
            1 => key.prop_map(EngineOp::Delete),
            1 => Just(EngineOp::Checkpoint),
        ]
    }
}
