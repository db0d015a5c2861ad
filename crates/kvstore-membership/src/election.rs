use std::collections::HashSet;
use std::time::Duration;

use kvstore_types::{NodeId, Term};
use rand::Rng;

/// Randomized election timeout: `base_ms` with `jitter_pct` jitter applied
/// in both directions (§4.4 recommends 500ms base, ±20% jitter).
pub fn election_timeout(base_ms: u64, jitter_pct: u32) -> Duration {
    let jitter_range = (base_ms * jitter_pct as u64) / 100;
    if jitter_range == 0 {
        return Duration::from_millis(base_ms);
    }
    let delta = rand::thread_rng().gen_range(0..=(2 * jitter_range)) as i64 - jitter_range as i64;
    let millis = (base_ms as i64 + delta).max(1) as u64;
    Duration::from_millis(millis)
}

/// Tracks votes received by a candidate for a single term. Votes for any
/// other term are ignored, since a stale response can arrive after the
/// candidate has already moved on.
pub struct VoteTally {
    term: Term,
    votes: HashSet<NodeId>,
}

impl VoteTally {
    pub fn new(term: Term, self_vote: NodeId) -> Self {
        let mut votes = HashSet::new();
        votes.insert(self_vote);
        Self { term, votes }
    }

    pub fn term(&self) -> Term {
        self.term
    }

    /// Record a vote response. No-op if it's for a different term.
    pub fn record(&mut self, term: Term, voter: NodeId, granted: bool) {
        if term == self.term && granted {
            self.votes.insert(voter);
        }
    }

    pub fn has_majority(&self, cluster_size: usize) -> bool {
        self.votes.len() >= cluster_size / 2 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn election_timeout_stays_within_jitter_band() {
        for _ in 0..100 {
            let d = election_timeout(500, 20);
            assert!(d.as_millis() >= 400 && d.as_millis() <= 600);
        }
    }

    #[test]
    fn vote_tally_ignores_votes_for_other_terms() {
        let mut tally = VoteTally::new(Term::new(3), NodeId::new(1));
        tally.record(Term::new(2), NodeId::new(2), true);
        assert!(!tally.has_majority(3));
    }

    #[test]
    fn vote_tally_reaches_majority_of_three() {
        let mut tally = VoteTally::new(Term::new(3), NodeId::new(1));
        assert!(!tally.has_majority(3));
        tally.record(Term::new(3), NodeId::new(2), true);
        assert!(tally.has_majority(3));
    }

    #[test]
    fn vote_tally_ignores_denied_votes() {
        let mut tally = VoteTally::new(Term::new(1), NodeId::new(1));
        tally.record(Term::new(1), NodeId::new(2), false);
        assert!(!tally.has_majority(3));
    }
}
