//! Candidate extraction from raw model output.
//!
//! Models rarely return a bare query: the expression usually arrives inside
//! a fenced code block, wrapped in backticks, or surrounded by commentary.
//! This module digs the query-shaped substring out, or reports that none
//! exists (the model refused or answered in prose).

use std::sync::OnceLock;

use regex::Regex;
use tracing::trace;

use crate::error::ValidationError;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // ```promql ... ``` or anonymous ``` ... ```
        Regex::new(r"(?s)```[ \t]*(?:promql|PromQL)?[ \t]*\n?(.*?)```").expect("valid fence regex")
    })
}

fn bare_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_:][A-Za-z0-9_:]*$").expect("valid token regex"))
}

fn inline_span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([^`\n]+)`").expect("valid span regex"))
}

/// Pulls the first query-shaped candidate out of `raw`.
///
/// Search order: fenced code blocks, then inline-backtick spans, then plain
/// lines. Fenced content may span lines (pretty-printed queries); plain
/// lines additionally go through a prose filter.
///
/// # Errors
/// Returns [`ValidationError::Extraction`] when nothing query-shaped is
/// found, e.g. when the model answered "I cannot help".
pub fn extract_candidate(raw: &str) -> Result<String, ValidationError> {
    for cap in fence_re().captures_iter(raw) {
        let block = cap[1].trim();
        if !block.is_empty() && charset_ok(block) && (has_structure(block) || is_bare_metric(block))
        {
            trace!("extract: candidate from fenced block");
            return Ok(collapse_whitespace(block));
        }
    }

    for cap in inline_span_re().captures_iter(raw) {
        let span = cap[1].trim();
        if query_shaped(span) {
            trace!("extract: candidate from inline span");
            return Ok(span.to_string());
        }
    }

    for line in raw.lines() {
        let line = line.trim();
        if query_shaped(line) {
            trace!("extract: candidate from plain line");
            return Ok(line.to_string());
        }
    }

    Err(ValidationError::Extraction(
        "no PromQL-shaped candidate found in model output".into(),
    ))
}

/// Shape test for a single line outside a fence.
fn query_shaped(line: &str) -> bool {
    if line.is_empty() || !charset_ok(line) {
        return false;
    }
    if is_bare_metric(line) {
        return true;
    }
    has_structure(line) && !looks_like_prose(line)
}

/// Every character belongs to the PromQL alphabet.
fn charset_ok(s: &str) -> bool {
    s.chars().all(|c| {
        c.is_ascii_alphanumeric()
            || c.is_ascii_whitespace()
            || matches!(
                c,
                '_' | ':' | '{' | '}' | '(' | ')' | '[' | ']' | '"' | '\'' | '='
                    | '~' | '!' | '<' | '>' | '+' | '-' | '*' | '/' | '%' | '^' | ',' | '.'
            )
    })
}

/// Selectors, calls, ranges, or a comparison: something only a query has.
fn has_structure(s: &str) -> bool {
    s.contains('{')
        || s.contains('(')
        || s.contains('[')
        || ["==", "!=", ">=", "<=", "=~", "!~", ">", "<"]
            .iter()
            .any(|op| s.contains(op))
}

/// A lone metric name is a valid instant query.
fn is_bare_metric(s: &str) -> bool {
    bare_token_re().is_match(s)
}

/// Natural-language sentences have runs of plain words; PromQL keywords
/// (`or`, `by`, `offset`, ...) only ever appear one at a time between
/// structured tokens. Two consecutive bare words means prose.
fn looks_like_prose(s: &str) -> bool {
    const KEYWORDS: &[&str] = &["and", "or", "unless", "by", "without", "offset", "bool"];
    let mut run = 0usize;
    for word in s.split_whitespace() {
        let plain_word =
            word.chars().all(|c| c.is_ascii_alphabetic()) && !KEYWORDS.contains(&word);
        if plain_word {
            run += 1;
            if run >= 2 {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// Joins a multi-line pretty-printed query into one line.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_promql_fence() {
        let raw = "Here you go:\n```promql\nrate(node_cpu_seconds_total[5m])\n```\nHope it helps!";
        assert_eq!(
            extract_candidate(raw).unwrap(),
            "rate(node_cpu_seconds_total[5m])"
        );
    }

    #[test]
    fn extracts_from_anonymous_fence() {
        let raw = "```\nsum(rate(http_requests_total[1m])) by (code)\n```";
        assert_eq!(
            extract_candidate(raw).unwrap(),
            "sum(rate(http_requests_total[1m])) by (code)"
        );
    }

    #[test]
    fn collapses_pretty_printed_fence() {
        let raw = "```promql\nsum by (instance) (\n  rate(node_cpu_seconds_total[5m])\n)\n```";
        assert_eq!(
            extract_candidate(raw).unwrap(),
            "sum by (instance) ( rate(node_cpu_seconds_total[5m]) )"
        );
    }

    #[test]
    fn extracts_from_inline_span() {
        let raw = "Use `up == 1` to check liveness.";
        assert_eq!(extract_candidate(raw).unwrap(), "up == 1");
    }

    #[test]
    fn extracts_bare_query_line() {
        let raw = "avg_over_time(node_load1[10m])";
        assert_eq!(extract_candidate(raw).unwrap(), raw);
    }

    #[test]
    fn bare_metric_name_is_a_candidate() {
        assert_eq!(extract_candidate("up").unwrap(), "up");
    }

    #[test]
    fn refusal_text_yields_extraction_error() {
        let err = extract_candidate("I cannot help with that request.").unwrap_err();
        assert!(matches!(err, ValidationError::Extraction(_)));
    }

    #[test]
    fn prose_with_parenthetical_is_not_a_candidate() {
        let err = extract_candidate("You should use the rate function (see docs) instead.")
            .unwrap_err();
        assert!(matches!(err, ValidationError::Extraction(_)));
    }

    #[test]
    fn keywords_between_structure_are_not_prose() {
        let raw = "sum(a) by (job) or sum(b) by (job)";
        assert_eq!(extract_candidate(raw).unwrap(), raw);
    }
}
