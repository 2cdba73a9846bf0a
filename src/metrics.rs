//! Ranking-quality metrics: recall@k, MRR, and nDCG@k.
//!
//! All functions score one ranked list of document ids against one relevance
//! list. They are deterministic, allocate nothing beyond a membership set,
//! and count duplicate ids in `results` once per occurrence.

use std::collections::HashSet;

/// Fraction of `relevant` found within the first `k` results.
///
/// Returns 0.0 when `relevant` is empty: an empty ground-truth set earns no
/// credit. Rankings shorter than `k` are scored over the available prefix.
pub fn recall_at_k(results: &[i64], relevant: &[i64], k: usize) -> f64 {
    if relevant.is_empty() || k == 0 {
        return 0.0;
    }

    let relevant_set = relevant.iter().copied().collect::<HashSet<i64>>();
    let hits = results
        .iter()
        .take(k)
        .filter(|doc_id| relevant_set.contains(doc_id))
        .count();
    hits as f64 / relevant.len() as f64
}

/// Reciprocal of the 1-based rank of the first relevant result, or 0.0 when
/// no relevant document appears anywhere in `results`.
///
/// Only the first hit counts, even when several relevant documents exist.
pub fn mrr(results: &[i64], relevant: &[i64]) -> f64 {
    let relevant_set = relevant.iter().copied().collect::<HashSet<i64>>();
    for (index, doc_id) in results.iter().enumerate() {
        if relevant_set.contains(doc_id) {
            return 1.0 / (index as f64 + 1.0);
        }
    }
    0.0
}

/// Normalized discounted cumulative gain at `k` with binary relevance.
///
/// The ideal ranking is the first `k` entries of `relevant` in the order
/// supplied, so callers wanting graded behavior must pass ids in priority
/// order. With binary gain every relevant hit contributes `1/log2(rank+1)`,
/// which makes the ideal value depend only on `min(k, relevant.len())`.
///
/// Returns 0.0 when `relevant` is empty or the ideal DCG is zero.
pub fn ndcg_at_k(results: &[i64], relevant: &[i64], k: usize) -> f64 {
    if relevant.is_empty() || k == 0 {
        return 0.0;
    }

    let relevant_set = relevant.iter().copied().collect::<HashSet<i64>>();
    let ideal_order = &relevant[..relevant.len().min(k)];
    let ideal = dcg_at_k(ideal_order, &relevant_set, k);
    if ideal <= 0.0 {
        return 0.0;
    }

    dcg_at_k(results, &relevant_set, k) / ideal
}

fn dcg_at_k(results: &[i64], relevant_set: &HashSet<i64>, k: usize) -> f64 {
    results
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, doc_id)| relevant_set.contains(doc_id))
        .map(|(index, _)| 1.0 / (index as f64 + 2.0).log2())
        .sum()
}
