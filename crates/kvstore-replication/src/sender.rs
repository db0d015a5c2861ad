use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use kvstore_protocol::ReplicationMessage;
use kvstore_storage::{Applied, MutationObserver, WalPayload};
use kvstore_types::{NodeId, Seq, Term};
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::queue::{QueuedEntry, DEFAULT_QUEUE_CAPACITY};
use crate::transport::FollowerLink;

struct FollowerChannel {
    tx: mpsc::Sender<QueuedEntry>,
    needs_resync: Arc<AtomicBool>,
    acked_seq: Arc<AtomicU64>,
}

/// Primary-side replication fan-out: registered as a [`MutationObserver`]
/// on the storage engine so every locally applied mutation is enqueued for
/// each follower under the same write gate that made it durable (§4.3).
///
/// `on_apply` never blocks: it uses `try_send`, so a stalled follower's
/// queue filling up shows up as a dropped entry and a resync flag, never as
/// back-pressure on the write path.
pub struct PrimaryReplicator {
    followers: RwLock<HashMap<NodeId, FollowerChannel>>,
}

impl PrimaryReplicator {
    pub fn new() -> Self {
        Self {
            followers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a follower, returning the resync flag (set when its queue
    /// overflows), the acked-seq counter (for `/status` peer lag), and the
    /// receiving half for a caller-spawned sender loop.
    pub fn register_follower(
        &self,
        node_id: NodeId,
    ) -> (Arc<AtomicBool>, Arc<AtomicU64>, mpsc::Receiver<QueuedEntry>) {
        let (tx, rx) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);
        let needs_resync = Arc::new(AtomicBool::new(false));
        let acked_seq = Arc::new(AtomicU64::new(0));
        self.followers.write().expect("replicator lock poisoned").insert(
            node_id,
            FollowerChannel {
                tx,
                needs_resync: needs_resync.clone(),
                acked_seq: acked_seq.clone(),
            },
        );
        (needs_resync, acked_seq, rx)
    }

    pub fn unregister_follower(&self, node_id: &NodeId) {
        self.followers.write().expect("replicator lock poisoned").remove(node_id);
    }

    /// Clear the resync flag once a snapshot resync has completed and a
    /// fresh queue has been registered for the follower.
    pub fn clear_resync(&self, needs_resync: &Arc<AtomicBool>) {
        needs_resync.store(false, Ordering::Release);
    }

    /// Last `seq` acked by each registered follower, for `/status` lag
    /// reporting (`primary_seq - acked_seq`).
    pub fn acked_seqs(&self) -> HashMap<NodeId, u64> {
        self.followers
            .read()
            .expect("replicator lock poisoned")
            .iter()
            .map(|(id, chan)| (*id, chan.acked_seq.load(Ordering::Acquire)))
            .collect()
    }
}

impl Default for PrimaryReplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationObserver for PrimaryReplicator {
    fn on_apply(&self, applied: &Applied) {
        let seq = applied.seq();
        let payload = wal_payload_of(applied);
        let kind = payload.kind_byte();
        let encoded = match bincode::serialize(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode replicated entry; skipping");
                return;
            }
        };

        let followers = self.followers.read().expect("replicator lock poisoned");
        for (node_id, channel) in followers.iter() {
            let entry = QueuedEntry {
                seq,
                kind,
                payload: encoded.clone(),
            };
            if channel.tx.try_send(entry).is_err() {
                channel.needs_resync.store(true, Ordering::Release);
                warn!(follower = %node_id, seq = seq.get(), "follower queue overflowed; resync required");
            }
        }
    }
}

fn wal_payload_of(applied: &Applied) -> WalPayload {
    match applied {
        Applied::Set { key, new, .. } => WalPayload::Set {
            key: key.as_bytes().to_vec(),
            value: new.as_bytes().to_vec(),
        },
        Applied::Delete { key, .. } => WalPayload::Delete {
            key: key.as_bytes().to_vec(),
        },
        Applied::BulkSet { pairs, .. } => WalPayload::BulkSet {
            pairs: pairs
                .iter()
                .map(|(k, v, _old)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
                .collect(),
        },
    }
}

/// Drains `rx` in order, shipping each entry to `link` and retrying with
/// exponential backoff and jitter on transport failure. A negative ack means
/// the follower has fallen out of sequence (`StorageError::OutOfOrder` on
/// its side): rather than spin on the same entry forever, this sets
/// `needs_resync` and moves on, so the queue keeps draining while whatever
/// drives the snapshot resync (the caller, watching the same flag) catches
/// the follower up. Once a resync lands the caller re-registers the
/// follower with a fresh queue and a new sender loop, so this instance's
/// remaining backlog is stale entries it simply races through.
/// Exits when the channel closes (follower unregistered or node shutdown).
pub async fn run_follower_sender(
    follower: NodeId,
    link: Arc<dyn FollowerLink>,
    current_term: impl Fn() -> Term,
    acked_seq: Arc<AtomicU64>,
    needs_resync: Arc<AtomicBool>,
    mut rx: mpsc::Receiver<QueuedEntry>,
) {
    while let Some(entry) = rx.recv().await {
        let mut attempt: u32 = 0;
        loop {
            let message = ReplicationMessage::Append {
                term: current_term().get(),
                seq: entry.seq.get(),
                kind: entry.kind,
                payload: entry.payload.clone(),
            };
            match link.send(message).await {
                Ok(ReplicationMessage::AppendAck { ok: true, .. }) => {
                    acked_seq.store(entry.seq.get(), Ordering::Release);
                    debug!(%follower, seq = entry.seq.get(), "entry acked");
                    break;
                }
                Ok(ReplicationMessage::AppendAck { ok: false, .. }) => {
                    needs_resync.store(true, Ordering::Release);
                    warn!(%follower, seq = entry.seq.get(), "follower gapped on append; snapshot resync requested");
                    break;
                }
                Ok(other) => {
                    warn!(%follower, seq = entry.seq.get(), reply = ?other, "unexpected reply to append, retrying");
                }
                Err(e) => {
                    warn!(%follower, seq = entry.seq.get(), error = %e, "append send failed, retrying");
                }
            }
            backoff(attempt).await;
            attempt = attempt.saturating_add(1);
        }
    }
}

async fn backoff(attempt: u32) {
    let base_ms: u64 = 50;
    let capped = base_ms.saturating_mul(1u64 << attempt.min(6));
    let jitter = rand::thread_rng().gen_range(0..=capped / 2 + 1);
    tokio::time::sleep(Duration::from_millis(capped + jitter)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvstore_types::{Key, Value};
    use std::sync::Mutex as StdMutex;

    struct RecordingLink {
        acked: StdMutex<Vec<ReplicationMessage>>,
        fail_first: StdMutex<u32>,
        gap_first: StdMutex<u32>,
    }

    #[async_trait::async_trait]
    impl FollowerLink for RecordingLink {
        async fn send(
            &self,
            message: ReplicationMessage,
        ) -> crate::error::ReplicationResult<ReplicationMessage> {
            let mut gap_remaining = self.gap_first.lock().unwrap();
            if *gap_remaining > 0 {
                *gap_remaining = gap_remaining.saturating_sub(1);
                if let ReplicationMessage::Append { term, seq, .. } = &message {
                    return Ok(ReplicationMessage::AppendAck {
                        term: *term,
                        seq: *seq,
                        ok: false,
                    });
                }
                unreachable!()
            }
            drop(gap_remaining);

            let mut remaining = self.fail_first.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(crate::error::ReplicationError::Transport {
                    peer: NodeId::new(1),
                    reason: "simulated transport failure".into(),
                });
            }
            if let ReplicationMessage::Append { term, seq, .. } = &message {
                self.acked.lock().unwrap().push(message.clone());
                return Ok(ReplicationMessage::AppendAck {
                    term: *term,
                    seq: *seq,
                    ok: true,
                });
            }
            unreachable!()
        }
    }

    #[test]
    fn on_apply_drops_silently_when_follower_queue_is_full() {
        let replicator = PrimaryReplicator::new();
        let (needs_resync, _acked, mut rx) = replicator.register_follower(NodeId::new(1));
        // Fill the queue without a receiver draining it.
        for i in 0..DEFAULT_QUEUE_CAPACITY + 5 {
            replicator.on_apply(&Applied::Set {
                seq: Seq(i as u64 + 1),
                key: Key::from(format!("k{i}")),
                new: Value::from("v"),
                old: None,
            });
        }
        assert!(needs_resync.load(Ordering::Acquire));
        rx.close();
    }

    #[tokio::test]
    async fn run_follower_sender_retries_until_acked() {
        let replicator = PrimaryReplicator::new();
        let (flag, acked, rx) = replicator.register_follower(NodeId::new(1));
        replicator.on_apply(&Applied::Set {
            seq: Seq(1),
            key: Key::from("a"),
            new: Value::from("1"),
            old: None,
        });

        let link = Arc::new(RecordingLink {
            acked: StdMutex::new(Vec::new()),
            fail_first: StdMutex::new(2),
            gap_first: StdMutex::new(0),
        });
        let link_clone = link.clone();
        let acked_seq = acked.clone();

        // Close the sender so the loop terminates once the single entry is acked.
        drop(replicator);

        let handle = tokio::spawn(run_follower_sender(
            NodeId::new(1),
            link_clone,
            || Term::new(1),
            acked_seq,
            flag,
            rx,
        ));
        handle.await.unwrap();

        assert_eq!(link.acked.lock().unwrap().len(), 1);
        assert_eq!(acked.load(Ordering::Acquire), 1);
    }

    #[tokio::test]
    async fn run_follower_sender_sets_needs_resync_on_gap_ack() {
        let replicator = PrimaryReplicator::new();
        let (flag, acked, rx) = replicator.register_follower(NodeId::new(1));
        replicator.on_apply(&Applied::Set {
            seq: Seq(5),
            key: Key::from("a"),
            new: Value::from("1"),
            old: None,
        });

        let link = Arc::new(RecordingLink {
            acked: StdMutex::new(Vec::new()),
            fail_first: StdMutex::new(0),
            gap_first: StdMutex::new(1),
        });
        let flag_clone = flag.clone();

        drop(replicator);

        let handle = tokio::spawn(run_follower_sender(
            NodeId::new(1),
            link,
            || Term::new(1),
            acked,
            flag_clone,
            rx,
        ));
        handle.await.unwrap();

        assert!(flag.load(Ordering::Acquire));
    }
}
