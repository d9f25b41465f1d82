//! End-to-end pipeline scenarios with deterministic stub collaborators.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::{future::Future, pin::Pin};

use example_store::{EmbeddingsProvider, ExampleSeed, ExampleStore, StoreConfig, StoreError};
use promql_validator::{MetricSchema, MetricType};
use tokio::sync::watch;
use translator::{
    CompletionProvider, FailureReason, GenerationConfig, GenerationError, PipelineConfig,
    TranslateOptions, TranslationResult, Translator,
};

/// Keyword-routed embedder: deterministic 3-dim vectors, no network.
struct FixtureEmbedder;

impl EmbeddingsProvider for FixtureEmbedder {
    fn embed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let t = text.to_ascii_lowercase();
            Ok(if t.contains("cpu") {
                vec![1.0, 0.0, 0.0]
            } else if t.contains("memory") {
                vec![0.0, 1.0, 0.0]
            } else {
                vec![0.0, 0.0, 1.0]
            })
        })
    }
}

/// Embedder that always times out, for the infrastructure-failure scenario.
struct UnreachableEmbedder;

impl EmbeddingsProvider for UnreachableEmbedder {
    fn embed<'a>(
        &'a self,
        _text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, StoreError>> + Send + 'a>> {
        Box::pin(async {
            Err(StoreError::Embedding(
                "embedding endpoint timed out after 30s".into(),
            ))
        })
    }
}

/// Generator that replays a fixed script; the last entry repeats forever.
struct ScriptedGenerator {
    script: Vec<Result<String, GenerationError>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn new(script: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    fn replying(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CompletionProvider for ScriptedGenerator {
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
        _system: &'a str,
        _cfg: &'a GenerationConfig,
    ) -> Pin<Box<dyn Future<Output = Result<String, GenerationError>> + Send + 'a>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.script[n.min(self.script.len() - 1)].clone()
        })
    }
}

fn schema() -> MetricSchema {
    MetricSchema::new("prometheus")
        .with_metric("node_cpu_seconds_total", MetricType::Counter, ["cpu", "mode"])
        .with_metric("node_memory_Active_bytes", MetricType::Gauge, [] as [&str; 0])
}

async fn corpus_store() -> Arc<ExampleStore> {
    let store = ExampleStore::new(StoreConfig::new_default(3)).unwrap();
    store
        .load(
            vec![
                ExampleSeed {
                    question: "what is the cpu usage over the last 5 minutes".into(),
                    promql: "rate(node_cpu_seconds_total[5m])".into(),
                    tags: BTreeSet::new(),
                    embedding: None,
                },
                ExampleSeed {
                    question: "how much memory is in use".into(),
                    promql: "node_memory_Active_bytes".into(),
                    tags: BTreeSet::new(),
                    embedding: None,
                },
            ],
            &FixtureEmbedder,
        )
        .await
        .unwrap();
    Arc::new(store)
}

async fn translator_with(
    generator: Arc<ScriptedGenerator>,
    embedder: Arc<dyn EmbeddingsProvider>,
) -> Translator {
    let cfg = PipelineConfig {
        transient_base_delay: std::time::Duration::from_millis(1),
        ..PipelineConfig::default()
    };
    Translator::new(corpus_store().await, schema(), embedder, generator, cfg)
}

#[tokio::test]
async fn cpu_usage_question_succeeds_with_rate_query() {
    let generator = Arc::new(ScriptedGenerator::replying(
        "```promql\nrate(node_cpu_seconds_total[5m])\n```",
    ));
    let t = translator_with(generator.clone(), Arc::new(FixtureEmbedder)).await;

    let result = t
        .translate(
            "show me CPU usage over the last 5 minutes",
            TranslateOptions::default(),
        )
        .await;

    match &result {
        TranslationResult::Success { query, attempts } => {
            assert_eq!(query, "rate(node_cpu_seconds_total[5m])");
            assert_eq!(attempts.len(), 1);
            assert_eq!(attempts[0].attempt_number, 1);
            assert!(attempts[0].parsed_query.is_some());
            assert!(attempts[0].validation_errors.is_empty());
            // The few-shot prompt carried the analogous example.
            assert!(attempts[0].prompt.contains("rate(node_cpu_seconds_total[5m])"));
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn refusing_generator_exhausts_attempt_budget() {
    let generator = Arc::new(ScriptedGenerator::replying("I cannot help with that."));
    let t = translator_with(generator.clone(), Arc::new(FixtureEmbedder)).await;

    let result = t
        .translate("show me CPU usage", TranslateOptions::default())
        .await;

    match &result {
        TranslationResult::Failure { reason, attempts } => {
            assert!(matches!(reason, FailureReason::MaxAttemptsExceeded));
            assert_eq!(attempts.len(), 3);
            for (i, a) in attempts.iter().enumerate() {
                assert_eq!(a.attempt_number as usize, i + 1);
                assert_eq!(a.validation_errors.len(), 1);
                assert!(a.validation_errors[0].contains("extraction error"));
            }
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn embedder_failure_fails_fast_with_zero_attempts() {
    let generator = Arc::new(ScriptedGenerator::replying("up"));
    let t = translator_with(generator.clone(), Arc::new(UnreachableEmbedder)).await;

    let result = t
        .translate("show me CPU usage", TranslateOptions::default())
        .await;

    match &result {
        TranslationResult::Failure { reason, attempts } => {
            assert!(matches!(reason, FailureReason::Embedding(_)));
            assert!(attempts.is_empty());
        }
        other => panic!("expected failure, got {other:?}"),
    }
    // Failure happened before PROMPTING: the generator was never called.
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn semantic_error_triggers_one_repair_round() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok("rate(node_memory_Active_bytes[5m])".into()),
        Ok("avg_over_time(node_memory_Active_bytes[5m])".into()),
    ]));
    let t = translator_with(generator.clone(), Arc::new(FixtureEmbedder)).await;

    let result = t
        .translate("average memory usage", TranslateOptions::default())
        .await;

    match &result {
        TranslationResult::Success { query, attempts } => {
            assert_eq!(query, "avg_over_time(node_memory_Active_bytes[5m])");
            assert_eq!(attempts.len(), 2);

            let first = &attempts[0];
            assert_eq!(first.attempt_number, 1);
            assert!(first.validation_errors[0].contains("semantic error"));
            assert!(first.validation_errors[0].contains("node_memory_Active_bytes"));

            // The repair prompt carries the first error verbatim.
            let second = &attempts[1];
            assert_eq!(second.attempt_number, 2);
            assert!(second.prompt.contains("Previous attempt failed because:"));
            assert!(second.prompt.contains(&first.validation_errors[0]));
            assert!(second.validation_errors.is_empty());
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn repair_errors_track_changing_generator_output() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok("first_unknown_metric".into()),
        Ok("second_unknown_metric".into()),
        Ok("third_unknown_metric".into()),
    ]));
    let t = translator_with(generator.clone(), Arc::new(FixtureEmbedder)).await;

    let result = t
        .translate("show me CPU usage", TranslateOptions::default())
        .await;

    let attempts = result.attempts();
    assert_eq!(attempts.len(), 3);
    assert_ne!(attempts[0].validation_errors, attempts[1].validation_errors);
    assert_ne!(attempts[1].validation_errors, attempts[2].validation_errors);
    assert!(attempts[0].validation_errors[0].contains("first_unknown_metric"));
    assert!(attempts[1].validation_errors[0].contains("second_unknown_metric"));
}

#[tokio::test]
async fn transient_generation_failures_do_not_consume_attempts() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Err(GenerationError::transient("429 too many requests")),
        Err(GenerationError::transient("429 too many requests")),
        Ok("```promql\nrate(node_cpu_seconds_total[5m])\n```".into()),
    ]));
    let t = translator_with(generator.clone(), Arc::new(FixtureEmbedder)).await;

    let result = t
        .translate("show me CPU usage", TranslateOptions::default())
        .await;

    match &result {
        TranslationResult::Success { attempts, .. } => {
            // Three generator calls, but a single pipeline attempt.
            assert_eq!(attempts.len(), 1);
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn permanent_generation_failure_ends_request_immediately() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Err(
        GenerationError::permanent("401 invalid api key"),
    )]));
    let t = translator_with(generator.clone(), Arc::new(FixtureEmbedder)).await;

    let result = t
        .translate("show me CPU usage", TranslateOptions::default())
        .await;

    match &result {
        TranslationResult::Failure { reason, attempts } => {
            assert!(matches!(reason, FailureReason::Generation(_)));
            assert!(attempts.is_empty());
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn pre_cancelled_request_fails_without_consuming_budget() {
    let generator = Arc::new(ScriptedGenerator::replying("up"));
    let t = translator_with(generator.clone(), Arc::new(FixtureEmbedder)).await;

    let (tx, rx) = watch::channel(true);
    let result = t
        .translate(
            "show me CPU usage",
            TranslateOptions {
                cancel: Some(rx),
                ..TranslateOptions::default()
            },
        )
        .await;
    drop(tx);

    match &result {
        TranslationResult::Failure { reason, attempts } => {
            assert!(matches!(reason, FailureReason::Cancelled));
            assert!(attempts.is_empty());
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_requests_do_not_share_attempt_state() {
    let ok = Arc::new(ScriptedGenerator::replying(
        "rate(node_cpu_seconds_total[5m])",
    ));
    let refusing = Arc::new(ScriptedGenerator::replying("no idea, sorry about that"));

    let store = corpus_store().await;
    let a = Translator::new(
        store.clone(),
        schema(),
        Arc::new(FixtureEmbedder),
        ok,
        PipelineConfig::default(),
    );
    let b = Translator::new(
        store,
        schema(),
        Arc::new(FixtureEmbedder),
        refusing,
        PipelineConfig::default(),
    );

    let (ra, rb) = tokio::join!(
        a.translate("cpu usage now", TranslateOptions::default()),
        b.translate("cpu usage now", TranslateOptions::default()),
    );

    assert!(ra.is_success());
    assert_eq!(ra.attempts().len(), 1);
    assert!(!rb.is_success());
    assert_eq!(rb.attempts().len(), 3);
}
