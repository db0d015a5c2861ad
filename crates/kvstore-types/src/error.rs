use thiserror::Error;

/// Errors produced by foundation type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid node id: {0}")]
    InvalidNodeId(String),

    #[error("term went backwards: current {current}, observed {observed}")]
    TermRegression { current: u64, observed: u64 },
}
