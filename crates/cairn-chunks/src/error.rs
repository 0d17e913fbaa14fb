use cairn_types::Hash;

/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A chunk's declared hash does not match the hash of its bytes.
    #[error("hash mismatch: declared {declared}, computed {computed}")]
    HashMismatch { declared: Hash, computed: Hash },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend failed for a reason specific to it.
    #[error("backend error: {0}")]
    Backend(String),

    /// The store has been closed.
    #[error("chunk store is closed")]
    Closed,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
