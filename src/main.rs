use std::collections::BTreeSet;
use std::error::Error;
use std::sync::Arc;

use colored::Colorize;
use tracing_subscriber::{Layer, filter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use example_store::embed::llm_embedder::{LlmEmbedder, LlmEmbedderConfig};
use example_store::{ExampleSeed, ExampleStore, StoreConfig};
use llm_service::LlmProfiles;
use llm_service::config::env_config;
use prom_discovery::PrometheusClient;
use promql_validator::{MetricSchema, MetricType};
use translator::{LlmCompletion, PipelineConfig, TranslateOptions, TranslationResult, Translator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load environment variables from .env file when present; process env
    // always wins.
    dotenvy::dotenv().ok();

    // The llm-service layer renders provider events with its own compact
    // format; the app layer handles everything else.
    let app_layer = fmt::layer().with_target(false).with_filter(filter::filter_fn(
        |meta| !meta.target().starts_with(llm_service::telemetry::TARGET_PREFIX),
    ));
    tracing_subscriber::registry()
        .with(llm_service::telemetry::env_filter("info"))
        .with(llm_service::telemetry::layer())
        .with(app_layer)
        .init();

    let question: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        eprintln!("usage: promql-ai-backend <natural language question>");
        std::process::exit(2);
    }

    // Model profiles from env (LLM_KIND, OLLAMA_*/OPENAI_*, EMBEDDING_MODEL).
    let svc = Arc::new(LlmProfiles::new(
        env_config::generation_from_env()?,
        env_config::embedding_from_env()?,
        Some(10),
    )?);

    for status in svc.health_all().await {
        let mark = if status.ok { "ok".green() } else { "unreachable".red() };
        tracing::info!(
            "{} {} [{}] {}",
            status.provider,
            status.endpoint,
            mark,
            status.message
        );
    }

    let embedding_dim = std::env::var("EMBEDDING_DIM")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(768);

    let embedder = Arc::new(LlmEmbedder::new(LlmEmbedderConfig {
        svc: svc.clone(),
        dim: embedding_dim,
    }));

    let store = Arc::new(ExampleStore::new(StoreConfig::new_default(embedding_dim))?);
    let loaded = store.load(seed_corpus(), embedder.as_ref()).await?;
    tracing::info!("example corpus loaded: {loaded} entries");

    // Schema snapshot: live discovery when PROMETHEUS_URL is set, otherwise
    // the built-in node/http seed schema.
    let prometheus = match std::env::var("PROMETHEUS_URL") {
        Ok(url) if !url.trim().is_empty() => Some(PrometheusClient::new(&url, 5)?),
        _ => None,
    };

    let schema = match &prometheus {
        Some(client) => match client.discover_schema().await {
            Ok(snapshot) => {
                tracing::info!("discovered {} metric families from Prometheus", snapshot.len());
                snapshot
            }
            Err(e) => {
                tracing::warn!("schema discovery failed ({e}); using seed schema");
                seed_schema()
            }
        },
        None => seed_schema(),
    };

    let translator = Translator::new(
        store,
        schema,
        embedder,
        Arc::new(LlmCompletion::new(svc)),
        PipelineConfig::default(),
    );

    let result = translator
        .translate(&question, TranslateOptions::default())
        .await;

    for attempt in result.attempts() {
        if attempt.validation_errors.is_empty() {
            tracing::debug!("attempt {}: accepted", attempt.attempt_number);
        } else {
            tracing::info!(
                "attempt {}: {}",
                attempt.attempt_number,
                attempt.validation_errors.join("; ")
            );
        }
    }

    match &result {
        TranslationResult::Success { query, attempts } => {
            println!("{}", query.green().bold());
            tracing::info!("succeeded after {} attempt(s)", attempts.len());

            if let Some(client) = &prometheus {
                if env_flag("PROMQL_EXECUTE") {
                    let data = client.instant_query(query, None).await?;
                    println!("{}", serde_json::to_string_pretty(&data)?);
                }
            }
        }
        TranslationResult::Failure { reason, attempts } => {
            eprintln!("{} {}", "translation failed:".red().bold(), reason);
            tracing::warn!("failed after {} attempt(s)", attempts.len());
            std::process::exit(1);
        }
    }

    Ok(())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "t" | "yes"))
        .unwrap_or(false)
}

/// Built-in worked examples covering the common node/http questions.
///
/// A real deployment replaces this with an external corpus loader; the
/// store only cares about the triples.
fn seed_corpus() -> Vec<ExampleSeed> {
    fn entry(question: &str, promql: &str, tags: &[&str]) -> ExampleSeed {
        ExampleSeed {
            question: question.to_string(),
            promql: promql.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
            embedding: None,
        }
    }

    vec![
        entry(
            "what is the cpu usage per instance over the last 5 minutes",
            r#"sum by (instance) (rate(node_cpu_seconds_total{mode!="idle"}[5m]))"#,
            &["node", "cpu"],
        ),
        entry(
            "how much memory is currently active on each node",
            "node_memory_Active_bytes",
            &["node", "memory"],
        ),
        entry(
            "total http requests per second grouped by response code",
            "sum by (code) (rate(http_requests_total[5m]))",
            &["http"],
        ),
        entry(
            "95th percentile request latency per handler",
            "histogram_quantile(0.95, sum by (le, handler) (rate(http_request_duration_seconds_bucket[5m])))",
            &["http", "latency"],
        ),
        entry("which instances are down right now", "up == 0", &["node"]),
        entry(
            "disk space available per device",
            "node_filesystem_avail_bytes",
            &["node", "disk"],
        ),
        entry(
            "average system load over the last 10 minutes",
            "avg_over_time(node_load1[10m])",
            &["node", "cpu"],
        ),
        entry(
            "rate of http 5xx errors",
            r#"rate(http_requests_total{code=~"5.."}[5m])"#,
            &["http", "errors"],
        ),
    ]
}

/// Fallback schema matching the seed corpus, used without a live Prometheus.
fn seed_schema() -> MetricSchema {
    MetricSchema::new("prometheus")
        .with_metric("node_cpu_seconds_total", MetricType::Counter, ["cpu", "mode"])
        .with_metric(
            "node_memory_Active_bytes",
            MetricType::Gauge,
            [] as [&str; 0],
        )
        .with_metric("node_load1", MetricType::Gauge, [] as [&str; 0])
        .with_metric(
            "node_filesystem_avail_bytes",
            MetricType::Gauge,
            ["device", "fstype", "mountpoint"],
        )
        .with_metric(
            "http_requests_total",
            MetricType::Counter,
            ["code", "method", "handler"],
        )
        .with_metric(
            "http_request_duration_seconds",
            MetricType::Histogram,
            ["handler"],
        )
        .with_metric("up", MetricType::Gauge, [] as [&str; 0])
}
