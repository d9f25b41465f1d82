//! Core data models used by the library.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Incoming corpus entry handed over by an external loader.
///
/// The embedding is optional: entries without one get vectorized at load
/// time. File formats are the loader's concern, not ours.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExampleSeed {
    /// Natural-language question this example answers.
    pub question: String,
    /// The PromQL expression that answers it.
    pub promql: String,
    /// Free-form labels used for optional retrieval filtering.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Precomputed embedding, if the loader has one cached.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// Canonical stored example. Immutable once loaded.
#[derive(Clone, Debug)]
pub struct Example {
    /// Natural-language question text.
    pub question: String,
    /// Target PromQL text.
    pub promql: String,
    /// Tag set for filtering.
    pub tags: BTreeSet<String>,
    /// Embedding vector; always present after a successful load.
    pub embedding: Vec<f32>,
    /// Position in the corpus; the stable tie-break for equal scores.
    pub ordinal: usize,
}

/// A single retrieval hit: an example plus its similarity score in `[0, 1]`.
#[derive(Clone, Debug)]
pub struct ScoredExample {
    pub score: f32,
    pub example: Example,
}
