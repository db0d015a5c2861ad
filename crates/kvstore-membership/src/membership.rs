use std::path::Path;
use std::sync::Mutex;

use kvstore_types::{NodeId, Role, Seq, Term};
use tracing::{info, warn};

use crate::error::MembershipResult;
use crate::meta::MetaStore;

pub struct MembershipConfig {
    pub node_id: NodeId,
    pub peers: Vec<NodeId>,
    pub initial_primary: bool,
}

struct Inner {
    role: Role,
    term: Term,
    voted_for: Option<NodeId>,
    last_known_leader: Option<NodeId>,
}

/// The per-node role state machine (§4.4): FOLLOWER / CANDIDATE / PRIMARY
/// transitions, term bookkeeping, and vote granting under the log-freshness
/// rule. Heartbeat and election timers live in the node runtime, which
/// calls into this type on timeout and on receipt of replication messages.
pub struct Membership {
    node_id: NodeId,
    peers: Vec<NodeId>,
    meta: MetaStore,
    inner: Mutex<Inner>,
}

impl Membership {
    /// Open membership state for `config.node_id`, restoring `(current_term,
    /// voted_for)` from `meta.json` if present. Role is always derived at
    /// startup, never persisted (§4.3): a restored node rejoins as FOLLOWER
    /// and must win an election to become PRIMARY again, except for the
    /// very first boot of a cluster's configured initial primary.
    pub fn open(config: MembershipConfig, data_dir: impl AsRef<Path>) -> MembershipResult<Self> {
        let meta = MetaStore::new(data_dir.as_ref().join("meta.json"));

        let (role, term, voted_for) = if meta.exists() {
            let (_persisted_node, term, voted_for) = meta.load()?;
            (Role::Follower, term, voted_for)
        } else {
            let term = if config.initial_primary { Term::first() } else { Term::zero() };
            let role = if config.initial_primary { Role::Primary } else { Role::Follower };
            meta.save(config.node_id, term, None)?;
            (role, term, None)
        };

        info!(node_id = %config.node_id, %role, %term, "membership state opened");

        Ok(Self {
            node_id: config.node_id,
            peers: config.peers,
            meta,
            inner: Mutex::new(Inner {
                role,
                term,
                voted_for,
                last_known_leader: if role == Role::Primary { Some(config.node_id) } else { None },
            }),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn role(&self) -> Role {
        self.inner.lock().expect("membership lock poisoned").role
    }

    pub fn term(&self) -> Term {
        self.inner.lock().expect("membership lock poisoned").term
    }

    pub fn last_known_leader(&self) -> Option<NodeId> {
        self.inner.lock().expect("membership lock poisoned").last_known_leader
    }

    pub fn cluster_size(&self) -> usize {
        self.peers.len() + 1
    }

    /// Writes are accepted only by a node whose role is PRIMARY (§4.4
    /// split-brain avoidance; term currency is implicit because `term` is
    /// only ever advanced forward in this struct, never read stale).
    pub fn can_accept_writes(&self) -> bool {
        self.role() == Role::Primary
    }

    /// FOLLOWER -> CANDIDATE on election timeout: increments term, votes for
    /// self, and persists before returning so a crash immediately after
    /// cannot forget this node's own vote.
    pub fn begin_election(&self) -> MembershipResult<Term> {
        let mut inner = self.inner.lock().expect("membership lock poisoned");
        let new_term = inner.term.next();
        inner.term = new_term;
        inner.role = Role::Candidate;
        inner.voted_for = Some(self.node_id);
        self.meta.save(self.node_id, new_term, Some(self.node_id))?;
        info!(node_id = %self.node_id, term = %new_term, "starting election");
        Ok(new_term)
    }

    /// Evaluate an incoming VoteRequest under the log-freshness rule (§4.4):
    /// grant iff the candidate's term is at least ours, we have not already
    /// voted for someone else this term, and the candidate is at least as
    /// up to date as we are. The decision is persisted before it is
    /// returned to the caller, which is what makes election safety survive
    /// a crash right after granting.
    pub fn handle_vote_request(
        &self,
        candidate_term: Term,
        candidate_id: NodeId,
        candidate_last_seq: Seq,
        our_last_applied_seq: Seq,
    ) -> MembershipResult<(Term, bool)> {
        let mut inner = self.inner.lock().expect("membership lock poisoned");

        if candidate_term < inner.term {
            return Ok((inner.term, false));
        }
        if candidate_term > inner.term {
            inner.term = candidate_term;
            inner.role = Role::Follower;
            inner.voted_for = None;
        }

        let already_voted_for_other = matches!(inner.voted_for, Some(v) if v != candidate_id);
        let log_is_fresh = candidate_last_seq >= our_last_applied_seq;
        let grant = !already_voted_for_other && log_is_fresh;

        if grant {
            inner.voted_for = Some(candidate_id);
        }
        self.meta.save(self.node_id, inner.term, inner.voted_for)?;
        Ok((inner.term, grant))
    }

    /// A node that observes a higher term anywhere (heartbeat, append,
    /// vote response) immediately steps down to FOLLOWER (§4.4).
    pub fn observe_term(&self, observed_term: Term) -> MembershipResult<bool> {
        let mut inner = self.inner.lock().expect("membership lock poisoned");
        if observed_term <= inner.term {
            return Ok(false);
        }
        inner.term = observed_term;
        inner.role = Role::Follower;
        inner.voted_for = None;
        self.meta.save(self.node_id, inner.term, None)?;
        warn!(node_id = %self.node_id, term = %observed_term, "stepped down to a higher term");
        Ok(true)
    }

    /// Accept a heartbeat from `leader_id` at `term`. Returns `false` if the
    /// heartbeat is stale (lower term than ours) and should be ignored.
    pub fn accept_heartbeat(&self, term: Term, leader_id: NodeId) -> MembershipResult<bool> {
        let mut inner = self.inner.lock().expect("membership lock poisoned");
        if term < inner.term {
            return Ok(false);
        }
        if term > inner.term {
            inner.term = term;
            inner.voted_for = None;
            self.meta.save(self.node_id, inner.term, None)?;
        }
        inner.role = Role::Follower;
        inner.last_known_leader = Some(leader_id);
        Ok(true)
    }

    /// CANDIDATE -> PRIMARY once a majority of votes arrive for `term`. A
    /// no-op if this node has since moved to a different term or role
    /// (e.g. it heard from a current-term leader while the election was
    /// still in flight).
    pub fn promote_to_primary(&self, term: Term) -> bool {
        let mut inner = self.inner.lock().expect("membership lock poisoned");
        if inner.role == Role::Candidate && inner.term == term {
            inner.role = Role::Primary;
            inner.last_known_leader = Some(self.node_id);
            info!(node_id = %self.node_id, %term, "elected primary");
            true
        } else {
            false
        }
    }
}
