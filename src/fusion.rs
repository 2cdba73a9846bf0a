//! Weighted Reciprocal Rank Fusion over one text and one vector ranking.

use std::collections::HashMap;

/// One row from the text-search provider, rank order implied by position.
/// Higher `score` is better.
#[derive(Debug, Clone)]
pub struct TextCandidate {
    pub document_id: i64,
    pub title: String,
    pub score: f64,
}

/// One row from the vector-search provider, rank order implied by position.
/// Lower `distance` is better.
#[derive(Debug, Clone)]
pub struct VectorCandidate {
    pub document_id: i64,
    pub title: String,
    pub distance: f64,
    pub similarity: f64,
}

/// Fusion parameters: the RRF smoothing constant and one weight per input
/// list. `rrf_k` controls how quickly fusion advantage decays with rank.
#[derive(Debug, Clone, Copy)]
pub struct RrfConfig {
    pub rrf_k: u32,
    pub weight_text: f64,
    pub weight_vector: f64,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            weight_text: 1.0,
            weight_vector: 1.0,
        }
    }
}

/// One entry of a fused ranking. The provenance fields record where the
/// document stood in each input list; they are diagnostic only and never
/// feed back into scoring.
#[derive(Debug, Clone)]
pub struct FusedHit {
    pub document_id: i64,
    pub title: Option<String>,
    pub rrf_score: f64,
    pub text_rank: Option<usize>,
    pub text_score: Option<f64>,
    pub vector_rank: Option<usize>,
    pub vector_distance: Option<f64>,
    pub vector_similarity: Option<f64>,
}

impl FusedHit {
    fn seed(document_id: i64) -> Self {
        Self {
            document_id,
            title: None,
            rrf_score: 0.0,
            text_rank: None,
            text_score: None,
            vector_rank: None,
            vector_distance: None,
            vector_similarity: None,
        }
    }
}

/// Fuse a text ranking and a vector ranking into one list ordered by
/// weighted RRF score.
///
/// Every document appearing in either input is a candidate; a missing list
/// contributes zero. Ranks are 1-based positions within each input. Equal
/// fused scores break ties by ascending document id, so the output is a
/// total order independent of map iteration. Truncation to `limit` happens
/// after sorting; truncating earlier would drop documents that fuse well
/// despite a low single-list rank.
pub fn fuse_rrf(
    text_candidates: &[TextCandidate],
    vector_candidates: &[VectorCandidate],
    config: &RrfConfig,
    limit: usize,
) -> Vec<FusedHit> {
    let rrf_base = f64::from(config.rrf_k);
    let mut merged = HashMap::<i64, FusedHit>::new();

    for (index, candidate) in text_candidates.iter().enumerate() {
        let rank = index + 1;
        let entry = merged
            .entry(candidate.document_id)
            .or_insert_with(|| FusedHit::seed(candidate.document_id));
        entry.rrf_score += config.weight_text / (rrf_base + rank as f64);
        entry.text_rank = Some(rank);
        entry.text_score = Some(candidate.score);
        if entry.title.is_none() {
            entry.title = Some(candidate.title.clone());
        }
    }

    for (index, candidate) in vector_candidates.iter().enumerate() {
        let rank = index + 1;
        let entry = merged
            .entry(candidate.document_id)
            .or_insert_with(|| FusedHit::seed(candidate.document_id));
        entry.rrf_score += config.weight_vector / (rrf_base + rank as f64);
        entry.vector_rank = Some(rank);
        entry.vector_distance = Some(candidate.distance);
        entry.vector_similarity = Some(candidate.similarity);
        if entry.title.is_none() {
            entry.title = Some(candidate.title.clone());
        }
    }

    let mut fused = merged.into_values().collect::<Vec<FusedHit>>();
    fused.sort_by(|left, right| {
        right
            .rrf_score
            .total_cmp(&left.rrf_score)
            .then_with(|| left.document_id.cmp(&right.document_id))
    });
    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::{FusedHit, RrfConfig, TextCandidate, VectorCandidate, fuse_rrf};

    use std::collections::HashSet;

    fn text(document_id: i64, score: f64) -> TextCandidate {
        TextCandidate {
            document_id,
            title: format!("doc-{document_id}"),
            score,
        }
    }

    fn vector(document_id: i64, distance: f64) -> VectorCandidate {
        VectorCandidate {
            document_id,
            title: format!("doc-{document_id}"),
            distance,
            similarity: 1.0 - distance,
        }
    }

    fn ids(hits: &[FusedHit]) -> Vec<i64> {
        hits.iter().map(|hit| hit.document_id).collect()
    }

    #[test]
    fn fuses_overlapping_lists_with_default_weights() {
        let text_candidates = vec![text(5, 12.0), text(3, 8.0)];
        let vector_candidates = vec![vector(3, 0.10), vector(9, 0.20)];
        let fused = fuse_rrf(
            &text_candidates,
            &vector_candidates,
            &RrfConfig::default(),
            10,
        );

        assert_eq!(ids(&fused), vec![3, 5, 9]);
        assert!((fused[0].rrf_score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-9);
        assert!((fused[0].rrf_score - 0.032522).abs() < 1e-6);
        assert!((fused[1].rrf_score - 1.0 / 61.0).abs() < 1e-9);
        assert!((fused[2].rrf_score - 1.0 / 62.0).abs() < 1e-9);
    }

    #[test]
    fn candidate_set_is_union_of_inputs() {
        let text_candidates = vec![text(1, 3.0), text(2, 2.0)];
        let vector_candidates = vec![vector(2, 0.1), vector(7, 0.4), vector(8, 0.5)];
        let fused = fuse_rrf(
            &text_candidates,
            &vector_candidates,
            &RrfConfig::default(),
            100,
        );

        let fused_ids = ids(&fused).into_iter().collect::<HashSet<i64>>();
        let expected = [1, 2, 7, 8].into_iter().collect::<HashSet<i64>>();
        assert_eq!(fused_ids, expected, "fusion must not invent or drop ids");
    }

    #[test]
    fn annotates_provenance_from_both_lists() {
        let fused = fuse_rrf(
            &[text(4, 9.5)],
            &[vector(4, 0.25)],
            &RrfConfig::default(),
            10,
        );

        let hit = &fused[0];
        assert_eq!(hit.text_rank, Some(1));
        assert_eq!(hit.text_score, Some(9.5));
        assert_eq!(hit.vector_rank, Some(1));
        assert_eq!(hit.vector_distance, Some(0.25));
        assert_eq!(hit.vector_similarity, Some(0.75));
        assert_eq!(hit.title.as_deref(), Some("doc-4"));
    }

    #[test]
    fn equal_scores_break_ties_by_ascending_document_id() {
        let config = RrfConfig {
            rrf_k: 60,
            weight_text: 0.0,
            weight_vector: 0.0,
        };
        let text_candidates = vec![text(9, 5.0), text(2, 4.0), text(7, 3.0)];
        let fused = fuse_rrf(&text_candidates, &[], &config, 10);
        assert_eq!(ids(&fused), vec![2, 7, 9]);
    }

    #[test]
    fn truncates_after_sorting_not_before() {
        // Document 42 sits at the bottom of both lists; with a pre-sort
        // truncation to 1 per list it would vanish even though its combined
        // contribution beats every single-list leader.
        let text_candidates = vec![text(1, 10.0), text(42, 1.0)];
        let vector_candidates = vec![vector(2, 0.1), vector(42, 0.9)];
        let config = RrfConfig::default();
        let fused = fuse_rrf(&text_candidates, &vector_candidates, &config, 1);

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].document_id, 42);
    }

    #[test]
    fn dominant_text_weight_converges_to_text_order() {
        let text_candidates = vec![text(10, 5.0), text(11, 4.0), text(12, 3.0)];
        let vector_candidates = vec![vector(12, 0.1), vector(20, 0.2), vector(10, 0.3)];
        let config = RrfConfig {
            rrf_k: 60,
            weight_text: 1.0e9,
            weight_vector: 1.0,
        };
        let fused = fuse_rrf(&text_candidates, &vector_candidates, &config, 10);

        assert_eq!(
            ids(&fused),
            vec![10, 11, 12, 20],
            "text-listed documents must follow pure text order, vector-only after"
        );
    }

    #[test]
    fn empty_inputs_fuse_to_empty_ranking() {
        assert!(fuse_rrf(&[], &[], &RrfConfig::default(), 10).is_empty());
    }

    #[test]
    fn repeated_invocations_are_independent() {
        let text_candidates = vec![text(1, 2.0), text(2, 1.0)];
        let vector_candidates = vec![vector(2, 0.2)];
        let heavy_text = RrfConfig {
            rrf_k: 60,
            weight_text: 3.0,
            weight_vector: 1.0,
        };
        let heavy_vector = RrfConfig {
            rrf_k: 60,
            weight_text: 1.0,
            weight_vector: 3.0,
        };

        let first = fuse_rrf(&text_candidates, &vector_candidates, &heavy_text, 10);
        let second = fuse_rrf(&text_candidates, &vector_candidates, &heavy_vector, 10);
        let first_again = fuse_rrf(&text_candidates, &vector_candidates, &heavy_text, 10);

        assert_eq!(ids(&first), ids(&first_again));
        assert_eq!(ids(&first), vec![1, 2]);
        assert_eq!(ids(&second), vec![2, 1]);
    }
}
