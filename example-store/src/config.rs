//! Runtime configuration for the store.

use crate::errors::StoreError;

/// Configuration for corpus ingestion and retrieval.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Dimensionality every stored vector must have.
    pub embedding_dim: usize,
    /// Maximum number of concurrent embedding tasks at load time.
    pub embedding_concurrency: usize,
}

impl StoreConfig {
    /// Creates a sane default config for a given vector dimensionality.
    pub fn new_default(embedding_dim: usize) -> Self {
        Self {
            embedding_dim,
            embedding_concurrency: 8,
        }
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.embedding_dim == 0 {
            return Err(StoreError::Config("embedding_dim must be > 0".into()));
        }
        if self.embedding_concurrency == 0 {
            return Err(StoreError::Config(
                "embedding_concurrency must be > 0".into(),
            ));
        }
        Ok(())
    }
}
