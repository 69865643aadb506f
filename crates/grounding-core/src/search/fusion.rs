//! Candidate fusion for hybrid search
//!
//! Two strategies merge the lexical and semantic candidate lists:
//!
//! ```text
//! blend(d) = w * lexical(d) + (1 - w) * semantic(d)     (missing side contributes 0)
//! rrf(d)   = sum over lists: 1 / (k + rank(d))          (rank is 1-based)
//! ```
//!
//! Fusion only decides which documents make the cut and in what order. The
//! hybrid retriever re-scores the survivors afterwards.
//!
//! # References
//!
//! Cormack, G. V., Clarke, C. L., & Buettcher, S. (2009).
//! "Reciprocal rank fusion outperforms condorcet and individual rank learning methods."

use crate::document::DocId;
use crate::search::rank_top_k;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Standard RRF constant (k=60 is widely used in literature)
pub const RRF_K: f32 = 60.0;

/// Equal weighting of lexical and semantic similarity
pub const DEFAULT_LEXICAL_WEIGHT: f32 = 0.5;

/// How hybrid search merges its two candidate lists
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FusionStrategy {
    /// Weighted sum of the raw similarities
    Blend { lexical_weight: f32 },
    /// Reciprocal Rank Fusion, ignoring raw scores
    ReciprocalRank { k: f32 },
}

impl Default for FusionStrategy {
    fn default() -> Self {
        FusionStrategy::Blend {
            lexical_weight: DEFAULT_LEXICAL_WEIGHT,
        }
    }
}

impl FromStr for FusionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "blend" => Ok(FusionStrategy::default()),
            "rrf" | "reciprocal_rank" => Ok(FusionStrategy::ReciprocalRank { k: RRF_K }),
            other => Err(format!("Unknown fusion strategy: {}", other)),
        }
    }
}

impl FusionStrategy {
    /// Merge both candidate lists into at most `limit` unique documents
    pub fn fuse(
        &self,
        lexical: &[(DocId, f32)],
        semantic: &[(DocId, f32)],
        limit: usize,
    ) -> Vec<(DocId, f32)> {
        match *self {
            FusionStrategy::Blend { lexical_weight } => {
                RankFusion::blend(lexical, semantic, lexical_weight, limit)
            }
            FusionStrategy::ReciprocalRank { k } => {
                RankFusion::reciprocal_rank(lexical, semantic, k, limit)
            }
        }
    }
}

/// Fusion of lexical and semantic candidate lists keyed by document id
pub struct RankFusion;

impl RankFusion {
    /// Weighted score blending
    ///
    /// Each candidate receives `lexical_weight * lexical_score` if it appeared
    /// in the lexical list and `(1 - lexical_weight) * semantic_score` if it
    /// appeared in the semantic list. Documents found by both lists are merged
    /// into a single entry.
    ///
    /// # Arguments
    ///
    /// * `lexical` - Ranked `(id, cosine)` candidates from lexical search
    /// * `semantic` - Ranked `(id, dot)` candidates from semantic search
    /// * `lexical_weight` - Weight of the lexical side, clamped to `[0, 1]`
    /// * `limit` - Maximum number of results to return
    ///
    /// # Returns
    ///
    /// Unique ids sorted by blended score descending, lower id first on ties
    pub fn blend(
        lexical: &[(DocId, f32)],
        semantic: &[(DocId, f32)],
        lexical_weight: f32,
        limit: usize,
    ) -> Vec<(DocId, f32)> {
        let w = lexical_weight.clamp(0.0, 1.0);
        let mut scores: BTreeMap<DocId, f32> = BTreeMap::new();

        for &(id, score) in lexical {
            *scores.entry(id).or_insert(0.0) += w * score;
        }
        for &(id, score) in semantic {
            *scores.entry(id).or_insert(0.0) += (1.0 - w) * score;
        }

        rank_top_k(scores.into_iter().collect(), limit)
    }

    /// Reciprocal Rank Fusion with constant `k`
    ///
    /// Lower k values increase the importance of top-ranked documents,
    /// while higher k values flatten the distribution.
    pub fn reciprocal_rank(
        lexical: &[(DocId, f32)],
        semantic: &[(DocId, f32)],
        k: f32,
        limit: usize,
    ) -> Vec<(DocId, f32)> {
        let mut scores: BTreeMap<DocId, f32> = BTreeMap::new();

        for list in [lexical, semantic] {
            for (rank, &(id, _)) in list.iter().enumerate() {
                *scores.entry(id).or_insert(0.0) += 1.0 / (k + rank as f32 + 1.0);
            }
        }

        rank_top_k(scores.into_iter().collect(), limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_blend_merges_shared_documents() {
        let lexical = vec![(0, 0.8), (1, 0.4)];
        let semantic = vec![(1, 0.9), (2, 0.7)];

        let fused = RankFusion::blend(&lexical, &semantic, 0.5, 10);

        let ids: Vec<DocId> = fused.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 0, 2]);
        assert!((fused[0].1 - 0.65).abs() < 1e-6);
    }

    #[test]
    fn test_blend_weight_extremes() {
        let lexical = vec![(0, 0.9)];
        let semantic = vec![(1, 0.9)];

        let lexical_only = RankFusion::blend(&lexical, &semantic, 1.0, 1);
        assert_eq!(lexical_only[0].0, 0);

        let semantic_only = RankFusion::blend(&lexical, &semantic, 0.0, 1);
        assert_eq!(semantic_only[0].0, 1);
    }

    #[test]
    fn test_rrf_fusion() {
        let lexical = vec![(2, 10.0), (1, 8.0), (3, 5.0)];
        let semantic = vec![(1, 0.9), (2, 0.8)];

        let fused = RankFusion::reciprocal_rank(&lexical, &semantic, RRF_K, 10);

        // 1 and 2 appear in both lists with ranks {2,1}; tie broken by id
        assert_eq!(fused[0].0, 1);
        assert_eq!(fused[1].0, 2);
        assert_eq!(fused[2].0, 3);
    }

    #[test]
    fn test_rrf_score_calculation() {
        let fused = RankFusion::reciprocal_rank(&[(4, 0.95)], &[(4, 15.0)], RRF_K, 10);

        assert_eq!(fused.len(), 1);
        // 1/(60+1) + 1/(60+1) = 2/61
        assert!((fused[0].1 - (2.0 / 61.0)).abs() < 0.001);
    }

    #[test]
    fn test_rrf_with_custom_k() {
        let fused = RankFusion::reciprocal_rank(&[(0, 0.9)], &[(0, 10.0)], 10.0, 10);
        // 1/(10+1) + 1/(10+1) = 2/11
        assert!((fused[0].1 - (2.0 / 11.0)).abs() < 0.001);
    }

    #[test]
    fn test_fusion_limit_and_uniqueness() {
        let lexical = vec![(0, 0.9), (1, 0.8), (2, 0.7)];
        let semantic = vec![(2, 0.9), (1, 0.8), (0, 0.7)];

        for strategy in [FusionStrategy::default(), FusionStrategy::ReciprocalRank { k: RRF_K }] {
            let fused = strategy.fuse(&lexical, &semantic, 2);
            assert_eq!(fused.len(), 2);
            assert_ne!(fused[0].0, fused[1].0);
        }
    }

    #[test]
    fn test_empty_lists() {
        assert!(RankFusion::blend(&[], &[], 0.5, 5).is_empty());
        let fused = RankFusion::reciprocal_rank(&[], &[(3, 0.2)], RRF_K, 5);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].0, 3);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("blend".parse::<FusionStrategy>(), Ok(FusionStrategy::default()));
        assert_eq!(
            "RRF".parse::<FusionStrategy>(),
            Ok(FusionStrategy::ReciprocalRank { k: RRF_K })
        );
        assert!("max".parse::<FusionStrategy>().is_err());
    }
}
