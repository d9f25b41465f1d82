//! Public API types for the translation pipeline.

use std::collections::BTreeSet;

use example_store::ScoredExample;
use promql_validator::Expr;
use thiserror::Error;
use tokio::sync::watch;

/// Ordered retrieval hits, most similar first.
pub type RetrievalResult = Vec<ScoredExample>;

/// Options that control a single translation request.
///
/// Setting a numeric field to `0` means: "use the value from the translator
/// config".
#[derive(Clone, Debug, Default)]
pub struct TranslateOptions {
    /// Validation-repair attempt budget. If `0`, falls back to config.
    pub max_attempts: u32,
    /// Number of examples to retrieve. If `0`, falls back to config.
    pub top_k: usize,
    /// Optional tag filter narrowing the example corpus.
    pub tags: BTreeSet<String>,
    /// Cancellation signal; flip the paired sender to `true` to abort.
    pub cancel: Option<watch::Receiver<bool>>,
}

/// Audit record of one pipeline attempt.
#[derive(Clone, Debug)]
pub struct TranslationAttempt {
    /// 1-based attempt counter.
    pub attempt_number: u32,
    /// The exact prompt sent to the generator.
    pub prompt: String,
    /// The raw completion text.
    pub raw_output: String,
    /// Parsed AST when validation succeeded.
    pub parsed_query: Option<Expr>,
    /// Validation errors, in the order they were produced.
    pub validation_errors: Vec<String>,
}

/// Why a request ended in `FAILED`.
#[derive(Clone, Debug, Error)]
pub enum FailureReason {
    /// The embedder was unreachable or returned malformed output.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The generator failed permanently (or exhausted its transient budget).
    #[error("generation error: {0}")]
    Generation(String),

    /// The validation-repair budget ran out.
    #[error("max attempts exceeded")]
    MaxAttemptsExceeded,

    /// The enclosing request was cancelled.
    #[error("cancelled")]
    Cancelled,
}

/// Terminal outcome of a translation request.
///
/// Either way the full attempt trail is carried for observability.
#[derive(Clone, Debug)]
pub enum TranslationResult {
    Success {
        /// The validated PromQL text.
        query: String,
        attempts: Vec<TranslationAttempt>,
    },
    Failure {
        reason: FailureReason,
        attempts: Vec<TranslationAttempt>,
    },
}

impl TranslationResult {
    /// The audit trail, regardless of outcome.
    pub fn attempts(&self) -> &[TranslationAttempt] {
        match self {
            Self::Success { attempts, .. } | Self::Failure { attempts, .. } => attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The final query, when the request succeeded.
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::Success { query, .. } => Some(query),
            Self::Failure { .. } => None,
        }
    }
}
