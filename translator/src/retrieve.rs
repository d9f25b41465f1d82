//! Retriever: embed the user query, search the example store.

use std::collections::BTreeSet;

use example_store::{EmbeddingsProvider, ExampleStore};
use tracing::{debug, trace};

use crate::types::RetrievalResult;

/// Embeds `user_query` and returns the top-`k` most similar examples.
///
/// Embedding failures (unreachable provider, wrong vector length) are not
/// retried here; the orchestrator decides what they mean for the request.
/// No side effects beyond whatever caching the embedder itself does.
///
/// # Errors
/// Returns the embedder/store failure message, pre-rendered for the
/// `FailureReason::Embedding` wrapper.
pub async fn retrieve(
    store: &ExampleStore,
    embedder: &dyn EmbeddingsProvider,
    user_query: &str,
    k: usize,
    tags: &BTreeSet<String>,
) -> Result<RetrievalResult, String> {
    trace!("retrieve: embedding query");
    let qv = embedder.embed(user_query).await.map_err(|e| e.to_string())?;

    let hits = if tags.is_empty() {
        store.search(&qv, k).await
    } else {
        store.search_tagged(&qv, k, tags).await
    }
    .map_err(|e| e.to_string())?;

    debug!("retrieve: k={} hits={}", k, hits.len());
    Ok(hits)
}
