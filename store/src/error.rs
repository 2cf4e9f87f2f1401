//! Storage error types.

/// Failure reading or committing state.
///
/// A commit that returns an error has applied none of its writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backend I/O failure.
    #[error("storage backend: {0}")]
    Backend(String),

    /// A stored value could not be interpreted.
    #[error("corrupt value at key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// The store has been closed.
    #[error("store closed")]
    Closed,
}
