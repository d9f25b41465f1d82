//! Unified error types for the crate.

use thiserror::Error;

/// Top-level error for example-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed corpus entry (empty question or query text).
    #[error("corpus load error: {0}")]
    CorpusLoad(String),

    /// Mismatch in vector dimensionality across records.
    #[error("vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },

    /// Embedding provider failure (unreachable backend, malformed output).
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Invalid or unsupported configuration.
    #[error("config error: {0}")]
    Config(String),
}
