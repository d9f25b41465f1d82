//! Prompt builder: few-shot examples + schema hint + repair context.
//!
//! `assemble` is a pure function of its [`PromptContext`]: the same context
//! always yields byte-identical prompt text. Retries make progress by
//! changing `prior_error` (or the example set), never by re-rolling the
//! same prompt.

use example_store::ScoredExample;

/// System instructions for the generator.
///
/// Keep this short and imperative: persona, scope, and a strict output
/// contract the extractor can rely on.
pub const SYSTEM_PROMPT: &str = "\
You are a senior SRE who translates natural-language monitoring questions \
into accurate, efficient PromQL. You know Prometheus metric conventions, \
rate()/increase() on counters, avg_over_time() on gauges, histogram \
quantiles, and sum/avg by () grouping. Use only metric and label names from \
the provided context; never invent names. Respond with exactly one PromQL \
expression inside a ```promql code block and nothing else.";

/// Everything the assembler needs for one attempt.
///
/// Constructed fresh per attempt by the orchestrator; never shared across
/// concurrent requests.
#[derive(Clone, Debug)]
pub struct PromptContext {
    /// Retrieved examples, most similar first.
    pub examples: Vec<ScoredExample>,
    /// The target question, verbatim.
    pub user_query: String,
    /// Pre-rendered schema lines relevant to this query.
    pub schema_hint: Vec<String>,
    /// Validation error from the previous attempt, verbatim.
    pub prior_error: Option<String>,
}

/// Builds the user prompt for one attempt under a character budget.
///
/// Layout: worked examples (most similar first, adjacent to the target to
/// exploit model recency bias), then the schema hint, then (on a retry)
/// the previous error verbatim, then the question. When the assembled text
/// would exceed `max_chars`, lowest-scoring examples are dropped first,
/// then the schema hint; the error section and the question are never
/// truncated.
pub fn assemble(ctx: &PromptContext, max_chars: usize) -> String {
    let tail = render_tail(ctx);

    // Examples are kept most-similar-first; to stay within budget we drop
    // from the back (lowest score).
    let mut kept = ctx.examples.len();
    let mut with_hint = true;
    loop {
        let hint: &[String] = if with_hint { &ctx.schema_hint } else { &[] };
        let head = render_head(&ctx.examples[..kept], hint);
        if head.len() + tail.len() <= max_chars || (kept == 0 && !with_hint) {
            return format!("{head}{tail}");
        }
        if kept > 0 {
            kept -= 1;
        } else {
            with_hint = false;
        }
    }
}

fn render_head(examples: &[ScoredExample], schema_hint: &[String]) -> String {
    let mut out = String::new();

    if !examples.is_empty() {
        out.push_str("Worked examples (most similar first):\n\n");
        for hit in examples {
            out.push_str("Q: ");
            out.push_str(hit.example.question.trim());
            out.push_str("\nPromQL: ");
            out.push_str(hit.example.promql.trim());
            out.push_str("\n\n");
        }
    }

    if !schema_hint.is_empty() {
        out.push_str("Available metrics:\n");
        for line in schema_hint {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }

    out
}

fn render_tail(ctx: &PromptContext) -> String {
    let mut out = String::new();

    if let Some(err) = &ctx.prior_error {
        out.push_str("Previous attempt failed because:\n");
        out.push_str(err);
        out.push_str("\nCorrect the query so this error does not occur again.\n\n");
    }

    out.push_str("Question: ");
    out.push_str(ctx.user_query.trim());
    out.push_str("\n\nRespond with exactly one PromQL expression in a ```promql code block.\n");

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn hit(score: f32, ordinal: usize, question: &str, promql: &str) -> ScoredExample {
        ScoredExample {
            score,
            example: example_store::Example {
                question: question.into(),
                promql: promql.into(),
                tags: BTreeSet::new(),
                embedding: vec![],
                ordinal,
            },
        }
    }

    fn ctx() -> PromptContext {
        PromptContext {
            examples: vec![
                hit(0.9, 0, "cpu usage last 5 minutes", "rate(node_cpu_seconds_total[5m])"),
                hit(0.5, 1, "memory in use", "node_memory_Active_bytes"),
            ],
            user_query: "show me CPU usage".into(),
            schema_hint: vec!["- node_cpu_seconds_total (counter) labels: cpu, mode".into()],
            prior_error: None,
        }
    }

    #[test]
    fn assemble_is_pure() {
        let c = ctx();
        assert_eq!(assemble(&c, 4000), assemble(&c, 4000));
    }

    #[test]
    fn examples_render_most_similar_first() {
        let text = assemble(&ctx(), 4000);
        let first = text.find("rate(node_cpu_seconds_total[5m])").unwrap();
        let second = text.find("node_memory_Active_bytes").unwrap();
        assert!(first < second);
    }

    #[test]
    fn error_section_sits_between_examples_and_question() {
        let mut c = ctx();
        c.prior_error = Some("schema error: unknown identifiers: node_cpu".into());
        let text = assemble(&c, 4000);

        let examples_at = text.find("Worked examples").unwrap();
        let error_at = text.find("Previous attempt failed because:").unwrap();
        let question_at = text.find("Question:").unwrap();
        assert!(examples_at < error_at && error_at < question_at);
        // verbatim, not paraphrased
        assert!(text.contains("schema error: unknown identifiers: node_cpu"));
    }

    #[test]
    fn over_budget_drops_lowest_scoring_example_first() {
        let c = ctx();
        let full = assemble(&c, 10_000);
        let budget = full.len() - 1;
        let trimmed = assemble(&c, budget);

        assert!(trimmed.contains("rate(node_cpu_seconds_total[5m])"));
        assert!(!trimmed.contains("node_memory_Active_bytes"));
    }

    #[test]
    fn question_and_error_survive_any_budget() {
        let mut c = ctx();
        c.prior_error = Some("syntax error at position 4: expected `)`".into());
        let text = assemble(&c, 1);
        assert!(text.contains("show me CPU usage"));
        assert!(text.contains("syntax error at position 4"));
    }
}
