//! Thin Prometheus HTTP API client.
//!
//! Two jobs, both outside the translation core proper:
//! - build a [`MetricSchema`] snapshot from a live Prometheus
//!   (`/api/v1/metadata` + `/api/v1/labels`) for the validator to consume
//! - execute a finished PromQL query (`/api/v1/query`) so a caller can run
//!   the translated expression
//!
//! The snapshot approximates per-metric label sets with the server's global
//! label name list; Prometheus only exposes exact per-series labels through
//! much heavier endpoints.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument};

use promql_validator::schema::{MetricDef, MetricSchema, MetricType};

/// Errors produced by the Prometheus client.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The endpoint is empty or does not start with http/https.
    #[error("invalid Prometheus endpoint: {0}")]
    InvalidEndpoint(String),

    /// Transport/HTTP client error.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-successful HTTP status from Prometheus.
    #[error("Prometheus returned HTTP {status} from {url}")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
    },

    /// Response decoded but reported a non-success status field.
    #[error("Prometheus API error: {0}")]
    Api(String),

    /// Unexpected/invalid JSON response.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Minimal Prometheus API client.
pub struct PrometheusClient {
    http: reqwest::Client,
    base: String,
}

impl PrometheusClient {
    /// Construct a new client against `base_url` with a request timeout.
    ///
    /// # Errors
    /// Returns [`DiscoveryError::InvalidEndpoint`] on a malformed URL or
    /// [`DiscoveryError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, DiscoveryError> {
        let trimmed = base_url.trim();
        if trimmed.is_empty()
            || !(trimmed.starts_with("http://") || trimmed.starts_with("https://"))
        {
            return Err(DiscoveryError::InvalidEndpoint(base_url.to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base: trimmed.trim_end_matches('/').to_string(),
        })
    }

    /// Checks Prometheus health by evaluating the trivial query `up`.
    pub async fn test_connection(&self) -> Result<(), DiscoveryError> {
        self.instant_query("up", None).await.map(|_| ())
    }

    /// Executes a generic instant PromQL query.
    ///
    /// # Arguments
    /// - `promql`: the query string
    /// - `time`: optional evaluation timestamp (unix seconds)
    ///
    /// # Errors
    /// Transport, HTTP-status, or API-status failures.
    #[instrument(skip_all, fields(query = %promql))]
    pub async fn instant_query(
        &self,
        promql: &str,
        time: Option<f64>,
    ) -> Result<Value, DiscoveryError> {
        let url = format!("{}/api/v1/query", self.base);
        let mut params: Vec<(&str, String)> = vec![("query", promql.to_string())];
        if let Some(t) = time {
            params.push(("time", t.to_string()));
        }

        debug!("GET {url}");
        let resp = self.http.get(&url).query(&params).send().await?;
        if !resp.status().is_success() {
            return Err(DiscoveryError::HttpStatus {
                status: resp.status(),
                url,
            });
        }

        let body: ApiEnvelope<Value> = resp
            .json()
            .await
            .map_err(|e| DiscoveryError::Decode(e.to_string()))?;
        body.into_data()
    }

    /// Builds a [`MetricSchema`] snapshot from metric metadata and the
    /// global label name list.
    ///
    /// # Errors
    /// Transport, HTTP-status, decode, or API-status failures.
    #[instrument(skip_all)]
    pub async fn discover_schema(&self) -> Result<MetricSchema, DiscoveryError> {
        let metadata: MetadataMap = {
            let url = format!("{}/api/v1/metadata", self.base);
            debug!("GET {url}");
            let resp = self.http.get(&url).send().await?;
            if !resp.status().is_success() {
                return Err(DiscoveryError::HttpStatus {
                    status: resp.status(),
                    url,
                });
            }
            let body: ApiEnvelope<MetadataMap> = resp
                .json()
                .await
                .map_err(|e| DiscoveryError::Decode(e.to_string()))?;
            body.into_data()?
        };

        let labels: Vec<String> = {
            let url = format!("{}/api/v1/labels", self.base);
            debug!("GET {url}");
            let resp = self.http.get(&url).send().await?;
            if !resp.status().is_success() {
                return Err(DiscoveryError::HttpStatus {
                    status: resp.status(),
                    url,
                });
            }
            let body: ApiEnvelope<Vec<String>> = resp
                .json()
                .await
                .map_err(|e| DiscoveryError::Decode(e.to_string()))?;
            body.into_data()?
        };

        let schema = build_schema(metadata, labels);
        info!("discovered schema with {} metric families", schema.len());
        Ok(schema)
    }
}

/* ==========================
Wire payloads & mapping
========================== */

/// Standard Prometheus API envelope: `{"status": "...", "data": ...}`.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status: String,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<T, DiscoveryError> {
        if self.status != "success" {
            return Err(DiscoveryError::Api(
                self.error.unwrap_or_else(|| self.status.clone()),
            ));
        }
        self.data
            .ok_or_else(|| DiscoveryError::Decode("missing `data` field".into()))
    }
}

/// `/api/v1/metadata` payload: metric name → metadata entries.
type MetadataMap = std::collections::BTreeMap<String, Vec<MetadataEntry>>;

#[derive(Debug, Deserialize)]
struct MetadataEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    help: Option<String>,
}

/// Maps the two API payloads into a validator schema.
fn build_schema(metadata: MetadataMap, labels: Vec<String>) -> MetricSchema {
    let label_set: std::collections::BTreeSet<String> = labels
        .into_iter()
        .filter(|l| l != "__name__")
        .collect();

    let mut schema = MetricSchema::new("prometheus");
    for (name, entries) in metadata {
        let Some(entry) = entries.first() else { continue };
        schema.insert(
            name,
            MetricDef {
                value_type: MetricType::from_metadata(&entry.kind),
                labels: label_set.clone(),
                help: entry.help.clone(),
            },
        );
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_schema_from_metadata_payload() {
        let raw = serde_json::json!({
            "node_cpu_seconds_total": [
                {"type": "counter", "help": "Seconds the CPUs spent in each mode."}
            ],
            "node_memory_Active_bytes": [
                {"type": "gauge", "help": "Memory information field Active_bytes."}
            ],
            "weird_metric": [
                {"type": "unknown"}
            ]
        });
        let metadata: MetadataMap = serde_json::from_value(raw).unwrap();
        let labels = vec!["__name__".to_string(), "cpu".to_string(), "mode".to_string()];

        let schema = build_schema(metadata, labels);
        assert_eq!(schema.len(), 3);

        let cpu = schema.resolve("node_cpu_seconds_total").unwrap();
        assert_eq!(cpu.effective_type(), MetricType::Counter);
        assert!(cpu.label_allowed("mode"));
        assert!(cpu.label_allowed("job"));

        let weird = schema.resolve("weird_metric").unwrap();
        assert_eq!(weird.effective_type(), MetricType::Untyped);
    }

    #[test]
    fn envelope_rejects_error_status() {
        let raw = r#"{"status":"error","error":"bad_data: invalid parameter"}"#;
        let env: ApiEnvelope<Vec<String>> = serde_json::from_str(raw).unwrap();
        let err = env.into_data().unwrap_err();
        assert!(matches!(err, DiscoveryError::Api(msg) if msg.contains("bad_data")));
    }

    #[test]
    fn client_rejects_bad_endpoint() {
        assert!(PrometheusClient::new("prometheus:9090", 5).is_err());
        assert!(PrometheusClient::new("http://prometheus:9090/", 5).is_ok());
    }
}
