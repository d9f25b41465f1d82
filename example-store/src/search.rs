//! Similarity scoring: cosine ranking with stable tie-breaks.

use crate::errors::StoreError;
use crate::record::{Example, ScoredExample};
use tracing::trace;

/// Ranks `examples` against `query` and returns the top `k` by cosine
/// similarity.
///
/// Ordering is total and deterministic: descending by raw cosine, ties
/// broken by corpus ordinal (insertion order). Reported scores are clamped
/// into `[0, 1]`; the clamp happens after ranking so it never reorders
/// results. If `k` exceeds the corpus size, every example is returned.
///
/// # Errors
/// Returns [`StoreError::VectorSizeMismatch`] if the query vector length
/// differs from the stored vectors.
pub fn top_k(examples: &[Example], query: &[f32], k: usize) -> Result<Vec<ScoredExample>, StoreError> {
    if let Some(first) = examples.first() {
        if query.len() != first.embedding.len() {
            return Err(StoreError::VectorSizeMismatch {
                got: query.len(),
                want: first.embedding.len(),
            });
        }
    }

    let mut ranked: Vec<(f32, &Example)> = examples
        .iter()
        .map(|ex| (cosine(query, &ex.embedding), ex))
        .collect();

    ranked.sort_by(|(sa, ea), (sb, eb)| {
        sb.total_cmp(sa).then_with(|| ea.ordinal.cmp(&eb.ordinal))
    });
    ranked.truncate(k);

    trace!("search::top_k k={} returned={}", k, ranked.len());

    Ok(ranked
        .into_iter()
        .map(|(score, ex)| ScoredExample {
            score: score.clamp(0.0, 1.0),
            example: ex.clone(),
        })
        .collect())
}

/// Cosine similarity of two vectors; zero vectors score 0.0.
pub(crate) fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    let len = a.len().min(b.len());
    for i in 0..len {
        dot += a[i] * b[i];
        na += a[i] * a[i];
        nb += b[i] * b[i];
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn ex(ordinal: usize, embedding: Vec<f32>) -> Example {
        Example {
            question: format!("q{ordinal}"),
            promql: format!("metric_{ordinal}"),
            tags: BTreeSet::new(),
            embedding,
            ordinal,
        }
    }

    #[test]
    fn ranks_by_similarity_desc() {
        let examples = vec![
            ex(0, vec![0.0, 1.0]),
            ex(1, vec![1.0, 0.0]),
            ex(2, vec![0.7, 0.7]),
        ];
        let hits = top_k(&examples, &[1.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].example.ordinal, 1);
        assert_eq!(hits[1].example.ordinal, 2);
        assert_eq!(hits[2].example.ordinal, 0);
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[test]
    fn equal_scores_break_ties_by_insertion_order() {
        let examples = vec![
            ex(0, vec![1.0, 0.0]),
            ex(1, vec![1.0, 0.0]),
            ex(2, vec![1.0, 0.0]),
        ];
        let hits = top_k(&examples, &[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].example.ordinal, 0);
        assert_eq!(hits[1].example.ordinal, 1);
    }

    #[test]
    fn k_larger_than_corpus_returns_all() {
        let examples = vec![ex(0, vec![1.0, 0.0]), ex(1, vec![0.0, 1.0])];
        let hits = top_k(&examples, &[1.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn scores_are_clamped_to_unit_interval() {
        // Opposite direction gives a negative cosine; report floor is 0.0.
        let examples = vec![ex(0, vec![-1.0, 0.0])];
        let hits = top_k(&examples, &[1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].score, 0.0);
    }

    #[test]
    fn query_dimension_is_checked() {
        let examples = vec![ex(0, vec![1.0, 0.0])];
        let err = top_k(&examples, &[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, StoreError::VectorSizeMismatch { got: 3, want: 2 }));
    }
}
