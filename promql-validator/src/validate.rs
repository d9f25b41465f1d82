//! Schema resolution and structural sanity checks over parsed candidates.
//!
//! Checks run in a fixed order and short-circuit on the first failing
//! category: extraction, grammar, schema, structure. The error text of the
//! failing category is what gets fed back into the repair prompt.

use std::collections::BTreeSet;

use tracing::debug;

use crate::ast::{Expr, VectorSelector};
use crate::error::ValidationError;
use crate::extract::extract_candidate;
use crate::parser;
use crate::schema::{MetricSchema, MetricType};

/// A candidate that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    /// The extracted query text, exactly as it will be returned to the caller.
    pub query: String,
    /// The parsed expression.
    pub ast: Expr,
}

/// Functions that only make sense over cumulative counters.
const COUNTER_FUNCS: &[&str] = &["rate", "irate", "increase", "resets"];

/// Functions whose first argument must be a range vector (`metric[5m]`).
const RANGE_FUNCS: &[&str] = &[
    "rate",
    "irate",
    "increase",
    "resets",
    "delta",
    "idelta",
    "deriv",
    "predict_linear",
    "changes",
    "avg_over_time",
    "sum_over_time",
    "min_over_time",
    "max_over_time",
    "count_over_time",
    "last_over_time",
    "stddev_over_time",
    "stdvar_over_time",
    "quantile_over_time",
    "absent_over_time",
];

/// Validates raw model output against the grammar and the metric schema.
///
/// Steps, short-circuiting on first failure:
/// 1. extract the candidate (strip fences/commentary)
/// 2. parse against the PromQL grammar
/// 3. resolve every referenced metric and label name against `schema`,
///    reporting **all** unresolved names at once
/// 4. structural sanity: selectors name a metric, aggregations wrap vector
///    expressions, counter functions take counter-typed range vectors
///
/// # Errors
/// One of the [`ValidationError`] categories; the rendered message is
/// suitable for a repair prompt verbatim.
pub fn validate(raw_output: &str, schema: &MetricSchema) -> Result<ValidatedQuery, ValidationError> {
    let candidate = extract_candidate(raw_output)?;
    debug!("validate: candidate=`{candidate}`");

    let ast = parser::parse(&candidate)?;

    check_schema(&ast, schema)?;
    check_structure(&ast, schema)?;

    Ok(ValidatedQuery {
        query: candidate,
        ast,
    })
}

/// Resolves metric and label references, collecting every unknown name.
fn check_schema(ast: &Expr, schema: &MetricSchema) -> Result<(), ValidationError> {
    let mut unknown: Vec<String> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut push = |unknown: &mut Vec<String>, name: &str| {
        if seen.insert(name.to_string()) {
            unknown.push(name.to_string());
        }
    };

    // Union of labels legal on any selector in the expression; grouping
    // clauses are checked against this.
    let mut known_labels: BTreeSet<String> = ["job", "instance", "__name__", "le", "quantile"]
        .into_iter()
        .map(str::to_string)
        .collect();

    for sel in ast.selectors() {
        let Some(metric) = &sel.metric else { continue };

        match schema.resolve(metric) {
            None => push(&mut unknown, metric),
            Some(resolved) => {
                known_labels.extend(resolved.def.labels.iter().cloned());
                for m in &sel.matchers {
                    if !resolved.label_allowed(&m.label) {
                        push(&mut unknown, &m.label);
                    }
                }
            }
        }
    }

    check_grouping_labels(ast, &known_labels, &mut |name| push(&mut unknown, name));

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Schema {
            unknown_identifiers: unknown,
        })
    }
}

fn check_grouping_labels(
    expr: &Expr,
    known_labels: &BTreeSet<String>,
    report: &mut dyn FnMut(&str),
) {
    match expr {
        Expr::Aggregation {
            grouping,
            param,
            expr,
            ..
        } => {
            if let Some(g) = grouping {
                for l in &g.labels {
                    if !known_labels.contains(l) {
                        report(l);
                    }
                }
            }
            if let Some(p) = param {
                check_grouping_labels(p, known_labels, report);
            }
            check_grouping_labels(expr, known_labels, report);
        }
        Expr::Function { args, .. } => {
            for a in args {
                check_grouping_labels(a, known_labels, report);
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            check_grouping_labels(lhs, known_labels, report);
            check_grouping_labels(rhs, known_labels, report);
        }
        Expr::Unary { expr, .. } | Expr::Paren(expr) => {
            check_grouping_labels(expr, known_labels, report)
        }
        Expr::Selector(_) | Expr::NumberLiteral(_) | Expr::StringLiteral(_) => {}
    }
}

/// Structural sanity over a schema-resolved expression.
fn check_structure(ast: &Expr, schema: &MetricSchema) -> Result<(), ValidationError> {
    walk_structure(ast, schema)
}

fn walk_structure(expr: &Expr, schema: &MetricSchema) -> Result<(), ValidationError> {
    match expr {
        Expr::Selector(sel) => check_selector(sel),
        Expr::NumberLiteral(_) | Expr::StringLiteral(_) => Ok(()),
        Expr::Aggregation {
            op, param, expr, ..
        } => {
            if let Some(p) = param {
                walk_structure(p, schema)?;
            }
            let inner = strip_parens(expr);
            if matches!(inner, Expr::NumberLiteral(_) | Expr::StringLiteral(_)) {
                return Err(semantic(format!(
                    "aggregation {op:?} wraps a literal; it must aggregate a vector expression"
                )));
            }
            walk_structure(expr, schema)
        }
        Expr::Function { name, args } => {
            check_function(name, args, schema)?;
            for a in args {
                walk_structure(a, schema)?;
            }
            Ok(())
        }
        Expr::Binary { lhs, rhs, .. } => {
            walk_structure(lhs, schema)?;
            walk_structure(rhs, schema)
        }
        Expr::Unary { expr, .. } | Expr::Paren(expr) => walk_structure(expr, schema),
    }
}

fn check_selector(sel: &VectorSelector) -> Result<(), ValidationError> {
    if sel.metric.is_none() {
        return Err(semantic(
            "vector selector has no metric name; every selector must reference a metric".into(),
        ));
    }
    Ok(())
}

fn check_function(name: &str, args: &[Expr], schema: &MetricSchema) -> Result<(), ValidationError> {
    if RANGE_FUNCS.contains(&name) {
        // quantile_over_time and predict_linear carry a leading/trailing
        // scalar; the range vector is the first selector-shaped argument.
        let range_arg = match name {
            "quantile_over_time" => args.get(1),
            _ => args.first(),
        };

        let Some(arg) = range_arg else {
            return Err(semantic(format!("{name}() is missing its range vector argument")));
        };

        let Expr::Selector(sel) = strip_parens(arg) else {
            return Err(semantic(format!(
                "{name}() expects a range vector selector like metric[5m], not a nested expression"
            )));
        };

        if sel.range.is_none() {
            return Err(semantic(format!(
                "{name}() expects a range vector; add a range like [5m] to the selector"
            )));
        }

        if COUNTER_FUNCS.contains(&name) {
            if let Some(metric) = &sel.metric {
                if let Some(resolved) = schema.resolve(metric) {
                    let t = resolved.effective_type();
                    if !matches!(t, MetricType::Counter | MetricType::Untyped) {
                        return Err(semantic(format!(
                            "{name}() applied to {t:?}-typed metric \"{metric}\"; {name} is only \
                             valid on counters; for gauges use avg_over_time, delta or the \
                             selector directly"
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

fn strip_parens(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(inner) => strip_parens(inner),
        other => other,
    }
}

fn semantic(details: String) -> ValidationError {
    ValidationError::Semantic { details }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MetricType;

    fn schema() -> MetricSchema {
        MetricSchema::new("prometheus")
            .with_metric("node_cpu_seconds_total", MetricType::Counter, ["cpu", "mode"])
            .with_metric("node_memory_Active_bytes", MetricType::Gauge, [] as [&str; 0])
            .with_metric("node_load1", MetricType::Gauge, [] as [&str; 0])
            .with_metric(
                "http_request_duration_seconds",
                MetricType::Histogram,
                ["handler"],
            )
    }

    #[test]
    fn accepts_well_formed_rate_query() {
        let out = validate("rate(node_cpu_seconds_total[5m])", &schema()).unwrap();
        assert_eq!(out.query, "rate(node_cpu_seconds_total[5m])");
    }

    #[test]
    fn unknown_metric_is_schema_error_not_syntax() {
        let err = validate("rate(node_cpu_utilization[5m])", &schema()).unwrap_err();
        match err {
            ValidationError::Schema {
                unknown_identifiers,
            } => assert_eq!(unknown_identifiers, vec!["node_cpu_utilization"]),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn all_unknown_names_reported_at_once() {
        let err = validate(
            r#"sum(rate(bogus_metric{bogus_label="x"}[5m])) + other_bogus"#,
            &schema(),
        )
        .unwrap_err();
        match err {
            ValidationError::Schema {
                unknown_identifiers,
            } => {
                assert_eq!(unknown_identifiers, vec!["bogus_metric", "other_bogus"]);
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_label_on_known_metric_reported() {
        let err = validate(
            r#"node_cpu_seconds_total{region="eu"}"#,
            &schema(),
        )
        .unwrap_err();
        match err {
            ValidationError::Schema {
                unknown_identifiers,
            } => assert_eq!(unknown_identifiers, vec!["region"]),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn rate_on_gauge_is_semantic_error() {
        let err = validate("rate(node_memory_Active_bytes[5m])", &schema()).unwrap_err();
        match err {
            ValidationError::Semantic { details } => {
                assert!(details.contains("Gauge"));
                assert!(details.contains("node_memory_Active_bytes"));
            }
            other => panic!("expected semantic error, got {other:?}"),
        }
    }

    #[test]
    fn rate_without_range_is_semantic_error() {
        let err = validate("rate(node_cpu_seconds_total)", &schema()).unwrap_err();
        assert!(matches!(err, ValidationError::Semantic { .. }));
    }

    #[test]
    fn bare_brace_selector_is_semantic_error() {
        let err = validate(r#"{mode="idle"}"#, &schema()).unwrap_err();
        assert!(matches!(err, ValidationError::Semantic { .. }));
    }

    #[test]
    fn aggregation_over_literal_is_semantic_error() {
        let err = validate("sum(42)", &schema()).unwrap_err();
        assert!(matches!(err, ValidationError::Semantic { .. }));
    }

    #[test]
    fn rate_on_histogram_bucket_is_accepted() {
        let q = "histogram_quantile(0.95, rate(http_request_duration_seconds_bucket[5m]))";
        assert!(validate(q, &schema()).is_ok());
    }

    #[test]
    fn avg_over_time_on_gauge_is_accepted() {
        assert!(validate("avg_over_time(node_load1[10m])", &schema()).is_ok());
    }

    #[test]
    fn grouping_by_unknown_label_reported() {
        let err = validate(
            "sum by (datacenter) (rate(node_cpu_seconds_total[5m]))",
            &schema(),
        )
        .unwrap_err();
        match err {
            ValidationError::Schema {
                unknown_identifiers,
            } => assert_eq!(unknown_identifiers, vec!["datacenter"]),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn validation_is_idempotent() {
        let s = schema();
        let raw = "rate(node_cpu_utilization[5m])";
        let a = validate(raw, &s).unwrap_err();
        let b = validate(raw, &s).unwrap_err();
        assert_eq!(a, b);
    }

    #[test]
    fn syntax_error_carries_position() {
        let err = validate("```promql\nsum(rate(node_cpu_seconds_total[5m])\n```", &schema())
            .unwrap_err();
        assert!(matches!(err, ValidationError::Syntax(_)));
    }
}
