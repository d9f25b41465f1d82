use crate::{EmbeddingsProvider, StoreError};
use std::{future::Future, pin::Pin};

/// Provider that refuses to embed. Useful when every corpus entry is
/// expected to arrive with a precomputed vector.
#[derive(Clone)]
pub struct NoopEmbedder;

impl EmbeddingsProvider for NoopEmbedder {
    fn embed<'a>(
        &'a self,
        _text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, StoreError>> + Send + 'a>> {
        Box::pin(async {
            Err(StoreError::Embedding(
                "missing embedding and no provider supplied".into(),
            ))
        })
    }
}
