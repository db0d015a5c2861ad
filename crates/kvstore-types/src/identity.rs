use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique small-integer identity for a cluster member.
///
/// Node ids are assigned at cluster configuration time (via `--node-id`) and
/// never change for the lifetime of the deployment.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u16);

impl NodeId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Monotonically increasing election epoch.
///
/// At most one node is [`Role::Primary`] per term across the cluster (see
/// the split-brain avoidance rule: a node only accepts writes while its role
/// is `Primary` and its term equals the highest term it has observed).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term(pub u64);

impl Term {
    pub const fn new(term: u64) -> Self {
        Self(term)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    /// The first term, used when a node is configured as the initial primary.
    pub const fn first() -> Self {
        Self(1)
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "term={}", self.0)
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Term({})", self.0)
    }
}

/// Replication role of a node, per the membership state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Primary,
    Follower,
    Candidate,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Primary => "PRIMARY",
            Role::Follower => "FOLLOWER",
            Role::Candidate => "CANDIDATE",
        };
        write!(f, "{s}")
    }
}
