/// Errors produced by the index manager. The index is purely in-memory, so
/// this enum stays small; most misuse is caught at the type level instead.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("search query tokenized to nothing")]
    EmptyQuery,

    #[error("top-k limit must be greater than zero")]
    ZeroLimit,
}

pub type IndexResult<T> = Result<T, IndexError>;
