use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use kvstore_index::{IndexManager, SearchMode as IndexSearchMode};
use kvstore_membership::{election_timeout, Membership, MembershipConfig, VoteTally};
use kvstore_protocol::request::SearchMode as WireSearchMode;
use kvstore_protocol::{ClientRequest, ClientResponse, ReplicationMessage, StatusCode};
use kvstore_replication::{
    apply_append, chunk_bytes, decode_snapshot, encode_snapshot, log_apply_failure,
    run_follower_sender, FollowerLink, PrimaryReplicator,
};
use kvstore_storage::{FileStorageEngine, StorageConfig};
use kvstore_types::{Key, NodeId, Role, Seq, Term, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::error::NodeResult;
use crate::status::NodeStatus;

/// In-progress snapshot transfer on the follower side of a resync. One at a
/// time per node: a follower only resyncs against its current primary.
#[derive(Default)]
struct SnapshotAssembly {
    seq: Option<Seq>,
    bytes: Vec<u8>,
}

/// Ties storage, indexing, membership, and replication together into one
/// node process (§4). Constructed once at startup; the client and
/// replication wire handlers in `kvstore-server` hold an `Arc<NodeRuntime>`
/// and call into it per connection.
pub struct NodeRuntime {
    config: NodeConfig,
    engine: Arc<FileStorageEngine>,
    index: Arc<IndexManager>,
    membership: Arc<Membership>,
    replicator: Arc<PrimaryReplicator>,
    last_heartbeat: Mutex<Instant>,
    snapshot_in_progress: AsyncMutex<SnapshotAssembly>,
}

impl NodeRuntime {
    pub fn open(config: NodeConfig) -> NodeResult<Arc<Self>> {
        let engine = Arc::new(FileStorageEngine::open(&config.data_dir, StorageConfig::default())?);
        let index = Arc::new(IndexManager::new());
        let replicator = Arc::new(PrimaryReplicator::new());

        engine.register_observer(index.clone());
        engine.register_observer(replicator.clone());
        let (state, _seq) = engine.snapshot_state();
        index.rebuild_from(&state);

        let membership = Arc::new(Membership::open(
            MembershipConfig {
                node_id: config.node_id,
                peers: config.peers.clone(),
                initial_primary: config.initial_primary,
            },
            &config.data_dir,
        )?);

        info!(
            node_id = %config.node_id,
            role = %membership.role(),
            keys = state.len(),
            "node runtime opened"
        );

        Ok(Arc::new(Self {
            config,
            engine,
            index,
            membership,
            replicator,
            last_heartbeat: Mutex::new(Instant::now()),
            snapshot_in_progress: AsyncMutex::new(SnapshotAssembly::default()),
        }))
    }

    pub fn node_id(&self) -> NodeId {
        self.membership.node_id()
    }

    pub fn membership(&self) -> &Arc<Membership> {
        &self.membership
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus::new(
            self.membership.node_id(),
            self.membership.role(),
            self.membership.term(),
            self.engine.last_applied_seq(),
            self.replicator.acked_seqs(),
        )
    }

    /// Register a live connection to a follower's replication port, wiring
    /// a sender loop that drains this node's replication queue for it, and
    /// a resync watcher that streams a snapshot (§4.3) whenever the sender
    /// marks the follower as gapped or its queue overflows.
    pub fn register_follower_link(self: &Arc<Self>, peer: NodeId, link: Arc<dyn FollowerLink>) {
        self.spawn_follower_tasks(peer, link);
    }

    fn spawn_follower_tasks(self: &Arc<Self>, peer: NodeId, link: Arc<dyn FollowerLink>) {
        let (needs_resync, acked, rx) = self.replicator.register_follower(peer);
        let membership = self.membership.clone();
        tokio::spawn(run_follower_sender(
            peer,
            link.clone(),
            move || membership.term(),
            acked,
            needs_resync.clone(),
            rx,
        ));

        let this = self.clone();
        tokio::spawn(this.run_resync_watcher(peer, link, needs_resync));
    }

    /// Polls `needs_resync` and, once set, streams the current store state
    /// to `peer` as `SnapshotBegin`/`SnapshotChunk`/`SnapshotEnd`, then
    /// re-registers the follower with a fresh queue and sender loop so the
    /// stale backlog behind the gap is superseded rather than replayed.
    async fn run_resync_watcher(
        self: Arc<Self>,
        peer: NodeId,
        link: Arc<dyn FollowerLink>,
        needs_resync: Arc<AtomicBool>,
    ) {
        let mut interval = tokio::time::interval(Duration::from_millis(200));
        loop {
            interval.tick().await;
            if !needs_resync.load(Ordering::Acquire) {
                continue;
            }
            match self.send_snapshot_resync(&link).await {
                Ok(seq) => {
                    self.replicator.clear_resync(&needs_resync);
                    self.replicator.unregister_follower(&peer);
                    info!(follower = %peer, seq = seq.get(), "snapshot resync completed");
                    self.spawn_follower_tasks(peer, link);
                    return;
                }
                Err(e) => {
                    warn!(follower = %peer, error = %e, "snapshot resync failed; will retry");
                }
            }
        }
    }

    async fn send_snapshot_resync(&self, link: &Arc<dyn FollowerLink>) -> NodeResult<Seq> {
        let (bytes, seq) = self.snapshot_for_resync()?;
        link.send(ReplicationMessage::SnapshotBegin { seq: seq.get() }).await?;
        for chunk in chunk_bytes(&bytes) {
            link.send(ReplicationMessage::SnapshotChunk { bytes: chunk }).await?;
        }
        link.send(ReplicationMessage::SnapshotEnd).await?;
        Ok(seq)
    }

    // -- client request dispatch (§6) -----------------------------------

    pub fn handle_client_request(&self, request: ClientRequest) -> ClientResponse {
        match request {
            ClientRequest::Set { key, value } => self.handle_set(key, value),
            ClientRequest::Get { key } => self.handle_get(key),
            ClientRequest::Delete { key } => self.handle_delete(key),
            ClientRequest::BulkSet { pairs } => self.handle_bulk_set(pairs),
            ClientRequest::Search { mode, query } => self.handle_search(mode, query),
            ClientRequest::SemSearch { k, threshold, query } => {
                self.handle_sem_search(k, threshold, query)
            }
        }
    }

    fn not_primary_status(&self) -> ClientResponse {
        ClientResponse::Status {
            code: StatusCode::NotPrimary,
            leader_hint: self.membership.last_known_leader(),
        }
    }

    fn handle_set(&self, key: Vec<u8>, value: Vec<u8>) -> ClientResponse {
        if !self.membership.can_accept_writes() {
            return self.not_primary_status();
        }
        match self.engine.set(Key::from(key), Value::from(value)) {
            Ok(()) => ClientResponse::Status {
                code: StatusCode::Ok,
                leader_hint: None,
            },
            Err(e) => {
                warn!(error = %e, "set failed");
                ClientResponse::Status {
                    code: StatusCode::IoError,
                    leader_hint: None,
                }
            }
        }
    }

    fn handle_get(&self, key: Vec<u8>) -> ClientResponse {
        let value = self.engine.get(&Key::from(key)).map(Value::into_bytes);
        ClientResponse::Value { value }
    }

    fn handle_delete(&self, key: Vec<u8>) -> ClientResponse {
        if !self.membership.can_accept_writes() {
            return ClientResponse::DeleteStatus {
                code: StatusCode::NotPrimary,
                existed: false,
                leader_hint: self.membership.last_known_leader(),
            };
        }
        match self.engine.delete(&Key::from(key)) {
            Ok(existed) => ClientResponse::DeleteStatus {
                code: StatusCode::Ok,
                existed,
                leader_hint: None,
            },
            Err(e) => {
                warn!(error = %e, "delete failed");
                ClientResponse::DeleteStatus {
                    code: StatusCode::IoError,
                    existed: false,
                    leader_hint: None,
                }
            }
        }
    }

    fn handle_bulk_set(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> ClientResponse {
        if !self.membership.can_accept_writes() {
            return self.not_primary_status();
        }
        let pairs = pairs
            .into_iter()
            .map(|(k, v)| (Key::from(k), Value::from(v)))
            .collect();
        match self.engine.bulk_set(pairs) {
            Ok(()) => ClientResponse::Status {
                code: StatusCode::Ok,
                leader_hint: None,
            },
            Err(e) => {
                warn!(error = %e, "bulk_set failed");
                ClientResponse::Status {
                    code: StatusCode::IoError,
                    leader_hint: None,
                }
            }
        }
    }

    fn handle_search(&self, mode: WireSearchMode, query: Vec<u8>) -> ClientResponse {
        let query = String::from_utf8_lossy(&query).into_owned();
        let mode = match mode {
            WireSearchMode::And => IndexSearchMode::And,
            WireSearchMode::Or => IndexSearchMode::Or,
        };
        let keys = self
            .index
            .search_text(&query, mode)
            .into_iter()
            .map(Key::into_bytes)
            .collect();
        ClientResponse::KeyList { keys }
    }

    fn handle_sem_search(&self, k: u32, threshold: f32, query: Vec<u8>) -> ClientResponse {
        let query = String::from_utf8_lossy(&query).into_owned();
        let scored = self
            .index
            .search_semantic(&query, k as usize, threshold as f64)
            .into_iter()
            .map(|(key, score)| (key.into_bytes(), score as f32))
            .collect();
        ClientResponse::ScoredList { scored }
    }

    // -- replication / election message dispatch (§6) --------------------

    /// Handle an inbound replication message, returning the reply frame (if
    /// any) to send back on the same connection.
    pub async fn handle_replication_message(
        &self,
        message: ReplicationMessage,
    ) -> Option<ReplicationMessage> {
        match message {
            ReplicationMessage::Append { term, seq, payload, .. } => {
                Some(self.handle_append(term, seq, payload).await)
            }
            ReplicationMessage::VoteRequest {
                term,
                candidate_id,
                last_applied_seq,
            } => Some(self.handle_vote_request(term, candidate_id, last_applied_seq)),
            ReplicationMessage::Heartbeat {
                term,
                leader_id,
                commit_seq: _,
            } => {
                self.handle_heartbeat(term, leader_id);
                None
            }
            ReplicationMessage::SnapshotBegin { seq } => {
                self.handle_snapshot_begin(seq).await;
                Some(self.snapshot_ack(seq))
            }
            ReplicationMessage::SnapshotChunk { bytes } => {
                self.handle_snapshot_chunk(bytes).await;
                Some(self.snapshot_ack(0))
            }
            ReplicationMessage::SnapshotEnd => {
                self.handle_snapshot_end().await;
                Some(self.snapshot_ack(0))
            }
            ReplicationMessage::AppendAck { .. } | ReplicationMessage::VoteResponse { .. } => {
                // These are primary-side replies, never expected inbound on
                // the follower side of the connection this runtime serves.
                None
            }
        }
    }

    async fn handle_append(&self, term: u64, seq: u64, payload: Vec<u8>) -> ReplicationMessage {
        let our_term = self.membership.term();
        if Term::new(term) < our_term {
            return ReplicationMessage::AppendAck {
                term: our_term.get(),
                seq,
                ok: false,
            };
        }
        self.touch_heartbeat();
        match apply_append(&self.engine, Seq(seq), &payload).await {
            Ok(()) => ReplicationMessage::AppendAck {
                term,
                seq,
                ok: true,
            },
            Err(e) => {
                log_apply_failure(Seq(seq), &e);
                ReplicationMessage::AppendAck {
                    term,
                    seq,
                    ok: false,
                }
            }
        }
    }

    fn handle_vote_request(&self, term: u64, candidate_id: u16, last_applied_seq: u64) -> ReplicationMessage {
        let (granted_term, granted) = self
            .membership
            .handle_vote_request(
                Term::new(term),
                NodeId::new(candidate_id),
                Seq(last_applied_seq),
                self.engine.last_applied_seq(),
            )
            .unwrap_or((self.membership.term(), false));
        if granted {
            self.touch_heartbeat();
        }
        ReplicationMessage::VoteResponse {
            term: granted_term.get(),
            vote_granted: granted,
        }
    }

    fn handle_heartbeat(&self, term: u64, leader_id: u16) {
        let accepted = self
            .membership
            .accept_heartbeat(Term::new(term), NodeId::new(leader_id))
            .unwrap_or(false);
        if accepted {
            self.touch_heartbeat();
        }
    }

    /// Snapshot messages have no dedicated ack variant on the wire (§6);
    /// an `AppendAck` with `ok: true` is reused since the sender only needs
    /// to know the frame round-tripped before moving to the next chunk.
    fn snapshot_ack(&self, seq: u64) -> ReplicationMessage {
        ReplicationMessage::AppendAck {
            term: self.membership.term().get(),
            seq,
            ok: true,
        }
    }

    async fn handle_snapshot_begin(&self, seq: u64) {
        let mut assembly = self.snapshot_in_progress.lock().await;
        *assembly = SnapshotAssembly {
            seq: Some(Seq(seq)),
            bytes: Vec::new(),
        };
    }

    async fn handle_snapshot_chunk(&self, mut chunk: Vec<u8>) {
        let mut assembly = self.snapshot_in_progress.lock().await;
        assembly.bytes.append(&mut chunk);
    }

    async fn handle_snapshot_end(&self) {
        let (seq, bytes) = {
            let mut assembly = self.snapshot_in_progress.lock().await;
            let seq = assembly.seq.take();
            (seq, std::mem::take(&mut assembly.bytes))
        };
        let Some(seq) = seq else {
            warn!("snapshot end received with no snapshot in progress");
            return;
        };
        match decode_snapshot(&bytes) {
            Ok(state) => {
                if let Err(e) = self.engine.replace_state(state, seq) {
                    warn!(error = %e, "failed to apply snapshot resync");
                    return;
                }
                let (fresh, _) = self.engine.snapshot_state();
                self.index.rebuild_from(&fresh);
                info!(seq = seq.get(), "snapshot resync applied");
            }
            Err(e) => warn!(error = %e, "failed to decode snapshot"),
        }
    }

    fn touch_heartbeat(&self) {
        *self.last_heartbeat.lock().expect("heartbeat lock poisoned") = Instant::now();
    }

    fn heartbeat_age(&self) -> Duration {
        self.last_heartbeat.lock().expect("heartbeat lock poisoned").elapsed()
    }

    /// Produce the full store snapshot and its `seq`, for serving a
    /// snapshot resync to a lagging follower (§4.3).
    pub fn snapshot_for_resync(&self) -> NodeResult<(Vec<u8>, Seq)> {
        let (state, seq) = self.engine.snapshot_state();
        let bytes = encode_snapshot(&state).map_err(|e| {
            kvstore_storage::StorageError::Serialization(e.to_string())
        })?;
        Ok((bytes, seq))
    }

    /// Drives the election timeout: a follower/candidate that hears no
    /// valid heartbeat within a randomized window starts an election and
    /// asks `request_vote` to canvass every peer. Runs until the task is
    /// aborted (node shutdown).
    pub async fn run_election_timer<F, Fut>(self: Arc<Self>, request_vote: F)
    where
        F: Fn(NodeId, ReplicationMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Option<ReplicationMessage>> + Send,
    {
        loop {
            let timeout = election_timeout(
                self.config.election_timeout_ms,
                self.config.election_jitter_pct,
            );
            tokio::time::sleep(timeout).await;

            if self.membership.role() == Role::Primary {
                continue;
            }
            if self.heartbeat_age() < timeout {
                continue;
            }

            let term = match self.membership.begin_election() {
                Ok(term) => term,
                Err(e) => {
                    warn!(error = %e, "failed to begin election");
                    continue;
                }
            };

            let mut tally = VoteTally::new(term, self.membership.node_id());
            for peer in self.config.peers.clone() {
                let request = ReplicationMessage::VoteRequest {
                    term: term.get(),
                    candidate_id: self.membership.node_id().get(),
                    last_applied_seq: self.engine.last_applied_seq().get(),
                };
                if let Some(ReplicationMessage::VoteResponse { term: reply_term, vote_granted }) =
                    request_vote(peer, request).await
                {
                    tally.record(Term::new(reply_term), peer, vote_granted);
                }
            }

            if tally.has_majority(self.membership.cluster_size()) {
                self.membership.promote_to_primary(term);
            }
        }
    }

    /// Drives periodic heartbeats while this node is primary.
    pub async fn run_heartbeat_loop<F, Fut>(self: Arc<Self>, send_heartbeat: F)
    where
        F: Fn(NodeId, ReplicationMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.heartbeat_ms));
        loop {
            interval.tick().await;
            if self.membership.role() != Role::Primary {
                continue;
            }
            let term = self.membership.term();
            let leader_id = self.membership.node_id().get();
            let commit_seq = self.engine.last_applied_seq().get();
            for peer in self.config.peers.clone() {
                let message = ReplicationMessage::Heartbeat {
                    term: term.get(),
                    leader_id,
                    commit_seq,
                };
                send_heartbeat(peer, message).await;
            }
        }
    }
}
