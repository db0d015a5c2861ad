use std::io;

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("node id {0} is not a configured peer")]
    UnknownPeer(u16),
}

pub type MembershipResult<T> = Result<T, MembershipError>;
