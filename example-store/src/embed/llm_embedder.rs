//! Embedding provider backed by the shared `llm-service` profiles.

use std::sync::Arc;

use crate::{EmbeddingsProvider, StoreError};
use llm_service::LlmProfiles;

/// Configuration for the service-backed embedder.
#[derive(Clone)]
pub struct LlmEmbedderConfig {
    pub svc: Arc<LlmProfiles>,
    /// Expected embedding dimension size.
    pub dim: usize,
}

/// Embedding provider delegating to the `llm-service` embedding profile.
///
/// The dimensionality is checked on every call: a backend that suddenly
/// returns a different vector length is malformed output, not a shorter
/// answer.
#[derive(Clone)]
pub struct LlmEmbedder {
    svc: Arc<LlmProfiles>,
    dim: usize,
}

impl LlmEmbedder {
    /// Construct a new embedder from configuration.
    pub fn new(cfg: LlmEmbedderConfig) -> Self {
        Self {
            svc: cfg.svc,
            dim: cfg.dim,
        }
    }
}

impl EmbeddingsProvider for LlmEmbedder {
    fn embed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<f32>, StoreError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let resp = self
                .svc
                .embed(text)
                .await
                .map_err(|e| StoreError::Embedding(e.to_string()))?;

            if resp.len() != self.dim {
                return Err(StoreError::VectorSizeMismatch {
                    got: resp.len(),
                    want: self.dim,
                });
            }

            Ok(resp)
        })
    }
}
