//! Error types for the diff crate.

use cairn_values::{Kind, ValueError};

/// Errors that can occur during diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// Loading or decoding a chunk failed.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// The two sides cannot be compared with the requested algorithm.
    #[error("cannot diff {last} against {current}")]
    KindMismatch { last: Kind, current: Kind },

    /// A diff worker thread could not be started.
    #[error("failed to spawn diff worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// A diff worker thread panicked.
    #[error("diff worker {0} panicked")]
    WorkerPanicked(&'static str),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
