//! Generator boundary: completion trait, failure classification, backoff.

use std::sync::Arc;
use std::time::Duration;
use std::{future::Future, pin::Pin};

use thiserror::Error;
use tracing::{debug, warn};

use llm_service::LlmProfiles;
use llm_service::profiles::SamplingOverrides;

/// Call contract for one completion request.
#[derive(Clone, Debug)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_length: u32,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_output_length: 512,
            stop_sequences: Vec::new(),
        }
    }
}

/// Whether retrying the same completion call can help.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationFailure {
    /// Rate limiting, timeouts, 5xx: worth retrying with backoff.
    Transient,
    /// Bad request, auth, decode failures: retrying will not help.
    Permanent,
}

/// Typed failure from the generator boundary.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct GenerationError {
    pub kind: GenerationFailure,
    pub message: String,
}

impl GenerationError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: GenerationFailure::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: GenerationFailure::Permanent,
            message: message.into(),
        }
    }
}

/// Provider interface for text generation.
///
/// Implement this to plug in a different backend; the pipeline only ever
/// talks to the generator through this seam, which is also what makes the
/// end-to-end tests deterministic.
pub trait CompletionProvider: Send + Sync {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        system: &'a str,
        cfg: &'a GenerationConfig,
    ) -> Pin<Box<dyn Future<Output = Result<String, GenerationError>> + Send + 'a>>;
}

/// Completion provider delegating to the `llm-service` generation profile.
#[derive(Clone)]
pub struct LlmCompletion {
    svc: Arc<LlmProfiles>,
}

impl LlmCompletion {
    pub fn new(svc: Arc<LlmProfiles>) -> Self {
        Self { svc }
    }
}

impl CompletionProvider for LlmCompletion {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        system: &'a str,
        cfg: &'a GenerationConfig,
    ) -> Pin<Box<dyn Future<Output = Result<String, GenerationError>> + Send + 'a>> {
        Box::pin(async move {
            let overrides = SamplingOverrides {
                temperature: Some(cfg.temperature),
                max_tokens: Some(cfg.max_output_length),
                stop: if cfg.stop_sequences.is_empty() {
                    None
                } else {
                    Some(cfg.stop_sequences.clone())
                },
            };

            self.svc
                .complete_with(prompt, Some(system), &overrides)
                .await
                .map_err(|e| {
                    if e.is_transient() {
                        GenerationError::transient(e.to_string())
                    } else {
                        GenerationError::permanent(e.to_string())
                    }
                })
        })
    }
}

/// Runs one completion with an independent transient-retry budget.
///
/// Transient failures (rate limit, timeout) are retried with exponential
/// backoff up to `max_tries` total calls; this budget is separate from and
/// consumed before the validation-repair attempt budget. Permanent failures
/// return immediately.
pub async fn complete_with_backoff(
    provider: &dyn CompletionProvider,
    prompt: &str,
    system: &str,
    cfg: &GenerationConfig,
    max_tries: u32,
    base_delay: Duration,
) -> Result<String, GenerationError> {
    let mut last: Option<GenerationError> = None;

    for attempt in 0..max_tries.max(1) {
        if attempt > 0 {
            let delay = base_delay * 2u32.saturating_pow(attempt - 1);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off before retry");
            tokio::time::sleep(delay).await;
        }

        match provider.complete(prompt, system, cfg).await {
            Ok(text) => return Ok(text),
            Err(e) if e.kind == GenerationFailure::Transient => {
                warn!(attempt, error = %e, "transient generation failure");
                last = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last.unwrap_or_else(|| GenerationError::transient("generation failed with no attempts")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        calls: AtomicU32,
        fail_first: u32,
        kind: GenerationFailure,
    }

    impl CompletionProvider for FlakyProvider {
        fn complete<'a>(
            &'a self,
            _prompt: &'a str,
            _system: &'a str,
            _cfg: &'a GenerationConfig,
        ) -> Pin<Box<dyn Future<Output = Result<String, GenerationError>> + Send + 'a>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < self.fail_first {
                    Err(GenerationError {
                        kind: self.kind,
                        message: format!("failure {n}"),
                    })
                } else {
                    Ok("up".to_string())
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let p = FlakyProvider {
            calls: AtomicU32::new(0),
            fail_first: 2,
            kind: GenerationFailure::Transient,
        };
        let out = complete_with_backoff(
            &p,
            "prompt",
            "system",
            &GenerationConfig::default(),
            3,
            Duration::from_millis(10),
        )
        .await
        .unwrap();
        assert_eq!(out, "up");
        assert_eq!(p.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_budget_is_bounded() {
        let p = FlakyProvider {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            kind: GenerationFailure::Transient,
        };
        let err = complete_with_backoff(
            &p,
            "prompt",
            "system",
            &GenerationConfig::default(),
            3,
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, GenerationFailure::Transient);
        assert_eq!(p.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_short_circuits() {
        let p = FlakyProvider {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            kind: GenerationFailure::Permanent,
        };
        let err = complete_with_backoff(
            &p,
            "prompt",
            "system",
            &GenerationConfig::default(),
            3,
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, GenerationFailure::Permanent);
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
    }
}
