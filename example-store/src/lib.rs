//! In-memory example corpus: ingestion + deterministic similarity search.
//!
//! This crate provides a clean API to:
//! - Load `(question, promql, tags)` corpus entries, embedding any entry
//!   that arrives without a precomputed vector
//! - Retrieve top‑K examples for a query vector by cosine similarity
//!
//! The design is flat (no deep nesting) and splits responsibilities into
//! focused modules. Search results are deterministic for a fixed corpus:
//! descending score, ties broken by insertion order.

mod config;
mod embed_pool;
mod errors;
mod record;
mod search;

pub mod embed;

pub use config::StoreConfig;
pub use embed::EmbeddingsProvider;
pub use errors::StoreError;
pub use record::{Example, ExampleSeed, ScoredExample};

use std::collections::BTreeSet;

use tokio::sync::RwLock;
use tracing::{debug, info, trace};

/// Shared, read-mostly store of worked examples.
///
/// `search` takes a read lock and never mutates; `load` stages the new
/// corpus entirely off-lock (including all embedding calls) and swaps it in
/// under a short write lock, so maintenance never interleaves with a search
/// mid-ranking and no lock is ever held across a network call.
pub struct ExampleStore {
    cfg: StoreConfig,
    examples: RwLock<Vec<Example>>,
}

impl ExampleStore {
    /// Constructs an empty store from the given configuration.
    ///
    /// # Errors
    /// Returns `StoreError::Config` on invalid configuration values.
    pub fn new(cfg: StoreConfig) -> Result<Self, StoreError> {
        cfg.validate()?;
        trace!("ExampleStore::new dim={}", cfg.embedding_dim);
        Ok(Self {
            cfg,
            examples: RwLock::new(Vec::new()),
        })
    }

    /// Loads (replaces) the corpus from external seed entries.
    ///
    /// Entries lacking an embedding are vectorized through `provider` with
    /// bounded concurrency. Every vector, precomputed or fresh, must match
    /// the configured dimensionality. The previous corpus stays visible to
    /// readers until the staged one is complete.
    ///
    /// # Errors
    /// - [`StoreError::CorpusLoad`] on a malformed entry (empty question or
    ///   query text)
    /// - [`StoreError::VectorSizeMismatch`] on a wrong-length vector
    /// - [`StoreError::Embedding`] if the provider fails
    pub async fn load(
        &self,
        corpus: Vec<ExampleSeed>,
        provider: &dyn EmbeddingsProvider,
    ) -> Result<usize, StoreError> {
        debug!("ExampleStore::load entries={}", corpus.len());

        let mut seeds = corpus;
        for (i, seed) in seeds.iter().enumerate() {
            if seed.question.trim().is_empty() {
                return Err(StoreError::CorpusLoad(format!(
                    "entry {i}: question text is empty"
                )));
            }
            if seed.promql.trim().is_empty() {
                return Err(StoreError::CorpusLoad(format!(
                    "entry {i}: promql text is empty"
                )));
            }
            if let Some(v) = &seed.embedding {
                if v.len() != self.cfg.embedding_dim {
                    return Err(StoreError::VectorSizeMismatch {
                        got: v.len(),
                        want: self.cfg.embedding_dim,
                    });
                }
            }
        }

        embed_pool::embed_missing(
            &mut seeds,
            provider,
            self.cfg.embedding_dim,
            self.cfg.embedding_concurrency,
        )
        .await?;

        let staged: Vec<Example> = seeds
            .into_iter()
            .enumerate()
            .map(|(ordinal, s)| Example {
                question: s.question,
                promql: s.promql,
                tags: s.tags,
                // embed_missing filled every hole above
                embedding: s.embedding.unwrap_or_default(),
                ordinal,
            })
            .collect();

        let count = staged.len();
        *self.examples.write().await = staged;
        info!("ExampleStore::load complete entries={count}");
        Ok(count)
    }

    /// Returns the `k` nearest examples to `query_vector` by cosine
    /// similarity, descending, ties broken by insertion order.
    ///
    /// If `k` exceeds the corpus size, all entries are returned sorted by
    /// score. Never mutates the store; safe for unlimited concurrent calls.
    ///
    /// # Errors
    /// Returns [`StoreError::VectorSizeMismatch`] if the query vector has
    /// the wrong length.
    pub async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredExample>, StoreError> {
        let guard = self.examples.read().await;
        search::top_k(&guard, query_vector, k)
    }

    /// Like [`ExampleStore::search`], but only considers examples carrying
    /// every tag in `tags`. An empty tag set matches everything.
    pub async fn search_tagged(
        &self,
        query_vector: &[f32],
        k: usize,
        tags: &BTreeSet<String>,
    ) -> Result<Vec<ScoredExample>, StoreError> {
        if tags.is_empty() {
            return self.search(query_vector, k).await;
        }
        let guard = self.examples.read().await;
        let filtered: Vec<Example> = guard
            .iter()
            .filter(|ex| tags.is_subset(&ex.tags))
            .cloned()
            .collect();
        search::top_k(&filtered, query_vector, k)
    }

    /// Current corpus size.
    pub async fn len(&self) -> usize {
        self.examples.read().await.len()
    }

    /// True when no corpus has been loaded yet.
    pub async fn is_empty(&self) -> bool {
        self.examples.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::noop_embedder::NoopEmbedder;
    use std::{future::Future, pin::Pin};

    /// Deterministic test embedder: maps known phrases to fixed vectors.
    struct FixtureEmbedder;

    impl EmbeddingsProvider for FixtureEmbedder {
        fn embed<'a>(
            &'a self,
            text: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, StoreError>> + Send + 'a>> {
            Box::pin(async move {
                Ok(match text {
                    t if t.contains("cpu") => vec![1.0, 0.0, 0.0],
                    t if t.contains("memory") => vec![0.0, 1.0, 0.0],
                    _ => vec![0.0, 0.0, 1.0],
                })
            })
        }
    }

    fn seed(question: &str, promql: &str) -> ExampleSeed {
        ExampleSeed {
            question: question.into(),
            promql: promql.into(),
            tags: BTreeSet::new(),
            embedding: None,
        }
    }

    #[tokio::test]
    async fn load_embeds_missing_vectors_and_search_ranks() {
        let store = ExampleStore::new(StoreConfig::new_default(3)).unwrap();
        let n = store
            .load(
                vec![
                    seed("cpu usage", "rate(node_cpu_seconds_total[5m])"),
                    seed("memory usage", "node_memory_Active_bytes"),
                ],
                &FixtureEmbedder,
            )
            .await
            .unwrap();
        assert_eq!(n, 2);

        let hits = store.search(&[1.0, 0.0, 0.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].example.promql, "rate(node_cpu_seconds_total[5m])");
    }

    #[tokio::test]
    async fn load_rejects_empty_question() {
        let store = ExampleStore::new(StoreConfig::new_default(3)).unwrap();
        let err = store
            .load(vec![seed("  ", "up")], &FixtureEmbedder)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CorpusLoad(_)));
    }

    #[tokio::test]
    async fn load_rejects_wrong_precomputed_dimension() {
        let store = ExampleStore::new(StoreConfig::new_default(3)).unwrap();
        let mut s = seed("cpu usage", "up");
        s.embedding = Some(vec![1.0, 0.0]);
        let err = store.load(vec![s], &NoopEmbedder).await.unwrap_err();
        assert!(matches!(err, StoreError::VectorSizeMismatch { got: 2, want: 3 }));
    }

    #[tokio::test]
    async fn search_returns_no_duplicates_and_at_most_k() {
        let store = ExampleStore::new(StoreConfig::new_default(3)).unwrap();
        store
            .load(
                vec![
                    seed("cpu one", "a"),
                    seed("cpu two", "b"),
                    seed("disk other", "c"),
                ],
                &FixtureEmbedder,
            )
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_ne!(hits[0].example.ordinal, hits[1].example.ordinal);
    }

    #[tokio::test]
    async fn tagged_search_filters_corpus() {
        let store = ExampleStore::new(StoreConfig::new_default(3)).unwrap();
        let mut tagged = seed("cpu tagged", "tagged_query");
        tagged.tags.insert("kubernetes".into());
        store
            .load(vec![seed("cpu plain", "plain_query"), tagged], &FixtureEmbedder)
            .await
            .unwrap();

        let want: BTreeSet<String> = ["kubernetes".to_string()].into();
        let hits = store.search_tagged(&[1.0, 0.0, 0.0], 5, &want).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].example.promql, "tagged_query");
    }
}
