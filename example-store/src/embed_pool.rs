//! Embedding executor with concurrency and dimension checks.

use crate::{embed::EmbeddingsProvider, errors::StoreError, record::ExampleSeed};
use futures::stream::{self, StreamExt};
use tracing::{debug, info};

/// Embeds question texts for seeds that have no precomputed vectors.
///
/// # Arguments
/// - `seeds`: mutable slice of corpus entries.
/// - `provider`: embedding backend.
/// - `expected_dim`: enforced vector size (error on mismatch).
/// - `concurrency`: maximum number of concurrent embedding tasks.
///
/// # Errors
/// Returns [`StoreError::VectorSizeMismatch`] if dimensions mismatch,
/// or [`StoreError::Embedding`] if the provider fails.
pub async fn embed_missing(
    seeds: &mut [ExampleSeed],
    provider: &dyn EmbeddingsProvider,
    expected_dim: usize,
    concurrency: usize,
) -> Result<(), StoreError> {
    info!(
        "embed_pool::embed_missing: total={} concurrency={}",
        seeds.len(),
        concurrency
    );

    let idxs: Vec<usize> = seeds
        .iter()
        .enumerate()
        .filter_map(|(i, s)| if s.embedding.is_none() { Some(i) } else { None })
        .collect();

    if idxs.is_empty() {
        debug!("embed_pool::embed_missing: nothing to embed");
        return Ok(());
    }

    let results: Vec<(usize, Vec<f32>)> = stream::iter(idxs.into_iter())
        .map(|i| {
            let text = seeds[i].question.clone();
            async move {
                let v = provider.embed(&text).await?;
                Ok::<(usize, Vec<f32>), StoreError>((i, v))
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, StoreError>>()?;

    for (i, v) in results {
        if v.len() != expected_dim {
            return Err(StoreError::VectorSizeMismatch {
                got: v.len(),
                want: expected_dim,
            });
        }
        seeds[i].embedding = Some(v);
    }

    debug!("embed_pool::embed_missing: embeddings filled");
    Ok(())
}
