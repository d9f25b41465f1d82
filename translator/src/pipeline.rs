//! Pipeline orchestration as an explicit finite-state machine.
//!
//! `RETRIEVING → PROMPTING → GENERATING → VALIDATING → {SUCCEEDED, RETRYING,
//! FAILED}`, with `RETRYING` looping back to `PROMPTING` while the attempt
//! budget lasts. Cancellation and budget exhaustion are first-class
//! transitions, not exception paths.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use example_store::{EmbeddingsProvider, ExampleStore, ScoredExample};
use promql_validator::schema::MetricSchema;
use promql_validator::validate;

use crate::generate::{
    CompletionProvider, GenerationConfig, GenerationFailure, complete_with_backoff,
};
use crate::prompt::{self, PromptContext};
use crate::retrieve;
use crate::types::{FailureReason, TranslateOptions, TranslationAttempt, TranslationResult};

/// Pipeline states; terminal states carry no data here, the run function
/// returns the [`TranslationResult`] directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Retrieving,
    Prompting,
    Generating,
    Validating,
    Retrying,
    Succeeded,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Retrieving => "RETRIEVING",
            Self::Prompting => "PROMPTING",
            Self::Generating => "GENERATING",
            Self::Validating => "VALIDATING",
            Self::Retrying => "RETRYING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Knobs shared by every request through one translator instance.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Validation-repair attempt budget (default 3).
    pub max_attempts: u32,
    /// Examples to retrieve per request (default 5).
    pub top_k: usize,
    /// Character budget for the assembled prompt.
    pub max_prompt_chars: usize,
    /// Generation call contract.
    pub generation: GenerationConfig,
    /// Transient-failure retry budget for one generation call.
    pub transient_max_tries: u32,
    /// Base delay of the transient backoff schedule.
    pub transient_base_delay: Duration,
    /// Cap on schema-hint entries rendered into the prompt.
    pub schema_hint_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            top_k: 5,
            max_prompt_chars: 6000,
            generation: GenerationConfig::default(),
            transient_max_tries: 3,
            transient_base_delay: Duration::from_millis(200),
            schema_hint_limit: 12,
        }
    }
}

/// Runs one translation request through the state machine.
///
/// Owns all per-request state (prompt context, attempt history); shares
/// nothing with concurrent requests except the read-only `store` and
/// `schema` snapshot.
pub async fn run(
    store: &ExampleStore,
    schema: &MetricSchema,
    embedder: &dyn EmbeddingsProvider,
    generator: &dyn CompletionProvider,
    cfg: &PipelineConfig,
    user_query: &str,
    opts: TranslateOptions,
) -> TranslationResult {
    let max_attempts = if opts.max_attempts == 0 {
        cfg.max_attempts
    } else {
        opts.max_attempts
    };
    let top_k = if opts.top_k == 0 { cfg.top_k } else { opts.top_k };
    let mut cancel = opts.cancel;

    let mut state = PipelineState::Retrieving;
    let mut attempts: Vec<TranslationAttempt> = Vec::new();
    debug!(%state, %user_query, "pipeline start");

    // RETRIEVING: embed + search once; retries re-prompt, they do not
    // re-retrieve. An embedder failure ends the request before any attempt
    // is recorded.
    let examples = {
        let fut = retrieve::retrieve(store, embedder, user_query, top_k, &opts.tags);
        tokio::select! {
            // Cancellation outranks a simultaneously-ready result.
            biased;
            _ = wait_cancelled(&mut cancel) => {
                warn!("pipeline cancelled during retrieval");
                return TranslationResult::Failure {
                    reason: FailureReason::Cancelled,
                    attempts,
                };
            }
            res = fut => match res {
                Ok(hits) => hits,
                Err(msg) => {
                    warn!(error = %msg, "embedding failed; request ends with zero attempts");
                    return TranslationResult::Failure {
                        reason: FailureReason::Embedding(msg),
                        attempts,
                    };
                }
            }
        }
    };

    let schema_hint = schema_hint_lines(schema, &examples, cfg.schema_hint_limit);
    let mut prior_error: Option<String> = None;

    for attempt_number in 1..=max_attempts {
        // PROMPTING: fresh context per attempt; the error context is the
        // only thing that changes between rounds.
        transition(&mut state, PipelineState::Prompting);
        let ctx = PromptContext {
            examples: examples.clone(),
            user_query: user_query.to_string(),
            schema_hint: schema_hint.clone(),
            prior_error: prior_error.clone(),
        };
        let prompt_text = prompt::assemble(&ctx, cfg.max_prompt_chars);

        // GENERATING: transient failures burn their own backoff budget
        // before this attempt is charged.
        transition(&mut state, PipelineState::Generating);
        let raw_output = {
            let fut = complete_with_backoff(
                generator,
                &prompt_text,
                prompt::SYSTEM_PROMPT,
                &cfg.generation,
                cfg.transient_max_tries,
                cfg.transient_base_delay,
            );
            tokio::select! {
                biased;
                _ = wait_cancelled(&mut cancel) => {
                    warn!(attempt_number, "pipeline cancelled during generation");
                    transition(&mut state, PipelineState::Failed);
                    return TranslationResult::Failure {
                        reason: FailureReason::Cancelled,
                        attempts,
                    };
                }
                res = fut => match res {
                    Ok(text) => text,
                    Err(e) => {
                        let exhausted = e.kind == GenerationFailure::Transient;
                        warn!(attempt_number, error = %e, exhausted, "generation failed");
                        transition(&mut state, PipelineState::Failed);
                        return TranslationResult::Failure {
                            reason: FailureReason::Generation(e.to_string()),
                            attempts,
                        };
                    }
                }
            }
        };

        // VALIDATING
        transition(&mut state, PipelineState::Validating);
        match validate(&raw_output, schema) {
            Ok(valid) => {
                attempts.push(TranslationAttempt {
                    attempt_number,
                    prompt: prompt_text,
                    raw_output,
                    parsed_query: Some(valid.ast),
                    validation_errors: Vec::new(),
                });
                transition(&mut state, PipelineState::Succeeded);
                info!(attempt_number, query = %valid.query, "translation succeeded");
                return TranslationResult::Success {
                    query: valid.query,
                    attempts,
                };
            }
            Err(err) => {
                let rendered = err.to_string();
                debug!(attempt_number, error = %rendered, "validation failed");
                attempts.push(TranslationAttempt {
                    attempt_number,
                    prompt: prompt_text,
                    raw_output,
                    parsed_query: None,
                    validation_errors: vec![rendered.clone()],
                });

                if attempt_number == max_attempts {
                    transition(&mut state, PipelineState::Failed);
                    warn!(max_attempts, "attempt budget exhausted");
                    return TranslationResult::Failure {
                        reason: FailureReason::MaxAttemptsExceeded,
                        attempts,
                    };
                }

                // RETRYING → PROMPTING with the error carried along.
                transition(&mut state, PipelineState::Retrying);
                prior_error = Some(rendered);
            }
        }
    }

    // max_attempts >= 1, so the loop always returns; this is unreachable
    // but keeps the function total.
    TranslationResult::Failure {
        reason: FailureReason::MaxAttemptsExceeded,
        attempts,
    }
}

fn transition(state: &mut PipelineState, to: PipelineState) {
    debug!(from = %state, to = %to, "pipeline transition");
    *state = to;
}

/// Resolves when the cancel signal fires; pends forever when there is none.
async fn wait_cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    match cancel {
        Some(rx) => loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without cancelling: never fires.
                std::future::pending::<()>().await;
            }
        },
        None => std::future::pending().await,
    }
}

/// Renders the schema lines relevant to this request: metrics referenced by
/// the retrieved examples first, padded with further families up to `limit`.
fn schema_hint_lines(
    schema: &MetricSchema,
    examples: &[ScoredExample],
    limit: usize,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut seen = std::collections::BTreeSet::new();

    // Metrics the examples actually use come first.
    for (name, def) in schema.iter() {
        if lines.len() >= limit {
            return lines;
        }
        if examples
            .iter()
            .any(|h| h.example.promql.contains(name.as_str()))
            && seen.insert(name.clone())
        {
            lines.push(render_hint_line(name, def));
        }
    }

    // Pad with the rest of the snapshot for discoverability.
    for (name, def) in schema.iter() {
        if lines.len() >= limit {
            break;
        }
        if seen.insert(name.clone()) {
            lines.push(render_hint_line(name, def));
        }
    }

    lines
}

fn render_hint_line(name: &str, def: &promql_validator::MetricDef) -> String {
    let kind = format!("{:?}", def.value_type).to_lowercase();
    let mut line = format!("- {name} ({kind})");
    if !def.labels.is_empty() {
        let labels = def.labels.iter().cloned().collect::<Vec<_>>().join(", ");
        line.push_str(&format!(" labels: {labels}"));
    }
    if let Some(help) = &def.help {
        line.push_str(&format!(": {help}"));
    }
    line
}
