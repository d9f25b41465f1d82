//! NL→PromQL translation pipeline.
//!
//! Public API: [`Translator::translate`]. It embeds the question, retrieves
//! top-K worked examples from `example-store`, assembles a few-shot prompt,
//! calls the generator, and validates the candidate against the metric
//! schema, repairing via a bounded re-prompt loop when validation fails.
//!
//! The store and schema are injected at construction (no process-wide
//! singletons); every request runs its own pipeline instance with
//! request-local state.

pub mod generate;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;
pub mod types;

pub use generate::{
    CompletionProvider, GenerationConfig, GenerationError, GenerationFailure, LlmCompletion,
};
pub use pipeline::{PipelineConfig, PipelineState};
pub use prompt::{PromptContext, SYSTEM_PROMPT, assemble};
pub use types::{
    FailureReason, RetrievalResult, TranslateOptions, TranslationAttempt, TranslationResult,
};

use std::sync::{Arc, RwLock};

use example_store::{EmbeddingsProvider, ExampleStore};
use promql_validator::MetricSchema;
use tracing::info;

/// The translation service. Construct once with its collaborators, share
/// via `Arc`, and call [`Translator::translate`] per request.
pub struct Translator {
    store: Arc<ExampleStore>,
    schema: RwLock<MetricSchema>,
    embedder: Arc<dyn EmbeddingsProvider>,
    generator: Arc<dyn CompletionProvider>,
    cfg: PipelineConfig,
}

impl Translator {
    /// Wires the pipeline to its injected dependencies.
    pub fn new(
        store: Arc<ExampleStore>,
        schema: MetricSchema,
        embedder: Arc<dyn EmbeddingsProvider>,
        generator: Arc<dyn CompletionProvider>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            store,
            schema: RwLock::new(schema),
            embedder,
            generator,
            cfg,
        }
    }

    /// Replaces the schema snapshot wholesale.
    ///
    /// In-flight requests keep validating against the snapshot they started
    /// with; the schema is never mutated mid-query.
    pub fn reload_schema(&self, snapshot: MetricSchema) {
        info!(metrics = snapshot.len(), "reloading metric schema snapshot");
        let mut guard = self.schema.write().unwrap_or_else(|e| e.into_inner());
        *guard = snapshot;
    }

    /// Translates a natural-language question into validated PromQL.
    ///
    /// Always returns a [`TranslationResult`] (never an unhandled fault):
    /// either the final query plus the full attempt trail, or a typed
    /// failure reason plus the partial trail.
    pub async fn translate(&self, user_query: &str, opts: TranslateOptions) -> TranslationResult {
        // Snapshot under a short read guard; the guard must not live across
        // an await point.
        let schema = self
            .schema
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        pipeline::run(
            &self.store,
            &schema,
            self.embedder.as_ref(),
            self.generator.as_ref(),
            &self.cfg,
            user_query,
            opts,
        )
        .await
    }
}
