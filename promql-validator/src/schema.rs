//! Read-only metric schema used for validation.
//!
//! A schema snapshot maps metric names to their label sets and value types.
//! It is produced by an external discovery collaborator and replaced
//! wholesale on reload; validation never mutates it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Prometheus metric value types, as reported by metadata endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    /// Exporters that don't declare a type; structural checks must not
    /// misfire on these.
    Untyped,
}

impl MetricType {
    /// Parses the lowercase type string from `/api/v1/metadata`.
    pub fn from_metadata(s: &str) -> Self {
        match s {
            "counter" => Self::Counter,
            "gauge" => Self::Gauge,
            "histogram" => Self::Histogram,
            "summary" => Self::Summary,
            _ => Self::Untyped,
        }
    }
}

/// Definition of one metric family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDef {
    pub value_type: MetricType,
    pub labels: BTreeSet<String>,
    /// Help text from metadata, carried into schema hints for the prompt.
    #[serde(default)]
    pub help: Option<String>,
}

/// Component series of a histogram/summary family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyComponent {
    Bucket,
    Count,
    Sum,
}

/// Result of resolving a referenced metric name against the schema.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedMetric<'a> {
    /// The family name the reference resolved to.
    pub base_name: &'a str,
    pub def: &'a MetricDef,
    /// `Some` when the reference was a `_bucket`/`_count`/`_sum` series of a
    /// histogram or summary family.
    pub component: Option<FamilyComponent>,
}

impl<'a> ResolvedMetric<'a> {
    /// The value type the referenced series actually behaves as.
    ///
    /// Histogram/summary component series are cumulative counters even
    /// though the family is typed histogram/summary.
    pub fn effective_type(&self) -> MetricType {
        if self.component.is_some() {
            MetricType::Counter
        } else {
            self.def.value_type
        }
    }

    /// Whether `label` may appear in a matcher on this reference.
    pub fn label_allowed(&self, label: &str) -> bool {
        if BUILTIN_LABELS.contains(&label) {
            return true;
        }
        if label == "le" && self.component == Some(FamilyComponent::Bucket) {
            return true;
        }
        if label == "quantile" && self.def.value_type == MetricType::Summary {
            return true;
        }
        self.def.labels.contains(label)
    }
}

/// Labels Prometheus attaches to every scraped series.
const BUILTIN_LABELS: &[&str] = &["job", "instance", "__name__"];

/// Immutable snapshot of the metrics known to one backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSchema {
    /// Backend identifier (e.g. `"prometheus"`); the multi-backend hook.
    backend: String,
    metrics: BTreeMap<String, MetricDef>,
}

impl MetricSchema {
    /// Creates an empty schema for the given backend identifier.
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            metrics: BTreeMap::new(),
        }
    }

    /// Backend identifier this schema describes.
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Inserts or replaces a metric definition.
    pub fn insert(&mut self, name: impl Into<String>, def: MetricDef) {
        self.metrics.insert(name.into(), def);
    }

    /// Builder-style insert used by seeds and tests.
    pub fn with_metric<I, S>(mut self, name: &str, value_type: MetricType, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(
            name,
            MetricDef {
                value_type,
                labels: labels.into_iter().map(Into::into).collect(),
                help: None,
            },
        );
        self
    }

    /// Number of metric families in the snapshot.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Iterates metric families in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricDef)> {
        self.metrics.iter()
    }

    /// Resolves a referenced series name to its family.
    ///
    /// Tries the exact name first; on a miss, strips a `_bucket`/`_count`/
    /// `_sum` suffix and retries against histogram/summary families.
    pub fn resolve(&self, name: &str) -> Option<ResolvedMetric<'_>> {
        if let Some((base, def)) = self.metrics.get_key_value(name) {
            return Some(ResolvedMetric {
                base_name: base,
                def,
                component: None,
            });
        }

        for (suffix, component) in [
            ("_bucket", FamilyComponent::Bucket),
            ("_count", FamilyComponent::Count),
            ("_sum", FamilyComponent::Sum),
        ] {
            if let Some(base) = name.strip_suffix(suffix) {
                if let Some((base, def)) = self.metrics.get_key_value(base) {
                    let is_family = matches!(
                        def.value_type,
                        MetricType::Histogram | MetricType::Summary
                    );
                    // `_bucket` only exists on histograms
                    let bucket_ok = component != FamilyComponent::Bucket
                        || def.value_type == MetricType::Histogram;
                    if is_family && bucket_ok {
                        return Some(ResolvedMetric {
                            base_name: base,
                            def,
                            component: Some(component),
                        });
                    }
                }
            }
        }

        None
    }

    /// Exact-name membership check (no suffix resolution).
    pub fn contains(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> MetricSchema {
        MetricSchema::new("prometheus")
            .with_metric(
                "node_cpu_seconds_total",
                MetricType::Counter,
                ["cpu", "mode"],
            )
            .with_metric("node_memory_Active_bytes", MetricType::Gauge, [] as [&str; 0])
            .with_metric(
                "http_request_duration_seconds",
                MetricType::Histogram,
                ["handler"],
            )
    }

    #[test]
    fn resolves_exact_name() {
        let s = schema();
        let r = s.resolve("node_cpu_seconds_total").unwrap();
        assert_eq!(r.effective_type(), MetricType::Counter);
        assert!(r.component.is_none());
    }

    #[test]
    fn resolves_histogram_bucket_series_as_counter() {
        let s = schema();
        let r = s.resolve("http_request_duration_seconds_bucket").unwrap();
        assert_eq!(r.base_name, "http_request_duration_seconds");
        assert_eq!(r.component, Some(FamilyComponent::Bucket));
        assert_eq!(r.effective_type(), MetricType::Counter);
        assert!(r.label_allowed("le"));
        assert!(r.label_allowed("handler"));
    }

    #[test]
    fn unknown_name_does_not_resolve() {
        assert!(schema().resolve("node_cpu_utilization").is_none());
        // `_sum` suffix on a plain counter is not a family component
        assert!(schema().resolve("node_cpu_seconds_total_sum").is_none());
    }

    #[test]
    fn builtin_labels_always_allowed() {
        let s = schema();
        let r = s.resolve("node_memory_Active_bytes").unwrap();
        assert!(r.label_allowed("instance"));
        assert!(r.label_allowed("job"));
        assert!(!r.label_allowed("mode"));
    }
}
