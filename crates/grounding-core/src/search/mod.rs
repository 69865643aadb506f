//! Search module - lexical, semantic and hybrid retrieval over the corpus
//!
//! This module provides:
//! - Lexical search over TF-IDF sparse vectors (cosine similarity)
//! - Semantic search over L2-normalised embeddings (dot product)
//! - Score blending / Reciprocal Rank Fusion for hybrid search
//!
//! Every retriever reads one [`CorpusSnapshot`](crate::storage::CorpusSnapshot)
//! per call, so a concurrent rebuild never mixes old and new indices.

pub mod fusion;
pub mod hybrid;
pub mod lexical;
pub mod semantic;

pub use fusion::{FusionStrategy, RankFusion};
pub use hybrid::HybridRetriever;
pub use lexical::{LexicalIndex, LexicalRetriever, SparseVector, TfIdfConfig, TfIdfVectorizer};
pub use semantic::{DenseIndex, IndexError, SemanticRetriever};

use crate::document::{Corpus, DocId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Which retriever produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    Lexical,
    Semantic,
    Hybrid,
}

impl fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetrievalSource::Lexical => "lexical",
            RetrievalSource::Semantic => "semantic",
            RetrievalSource::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// A single ranked document returned by a retriever
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub document: String,
    pub similarity_score: f32,
    /// Stable id of the document in the corpus it was retrieved from
    pub index: DocId,
    pub source: RetrievalSource,
}

/// Top-k retrieval over the current corpus.
///
/// Implementations never fail: an empty corpus, a missing index or an
/// unavailable encoder all yield an empty list.
pub trait Retriever: Send + Sync {
    fn retrieve(&self, query: &str, k: usize) -> Vec<RetrievalResult>;

    fn source(&self) -> RetrievalSource;
}

/// Retrieval backend selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetrievalMode {
    #[default]
    Hybrid,
    Lexical,
    Semantic,
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hybrid" => Ok(RetrievalMode::Hybrid),
            "tfidf" | "lexical" => Ok(RetrievalMode::Lexical),
            "semantic" => Ok(RetrievalMode::Semantic),
            other => Err(format!("Unknown retrieval mode: {}", other)),
        }
    }
}

/// Rank `(id, score)` pairs by score descending, lower id first on ties,
/// and keep the best `k`.
pub(crate) fn rank_top_k(mut scored: Vec<(DocId, f32)>, k: usize) -> Vec<(DocId, f32)> {
    for (_, score) in scored.iter_mut() {
        if !score.is_finite() {
            *score = 0.0;
        }
    }
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}

/// Rank a dense score row (one score per document id)
pub(crate) fn top_k(scores: &[f32], k: usize) -> Vec<(DocId, f32)> {
    rank_top_k(scores.iter().copied().enumerate().collect(), k)
}

/// Turn ranked ids into results, dropping ids the corpus does not know
pub(crate) fn resolve_hits(
    corpus: &Corpus,
    hits: Vec<(DocId, f32)>,
    source: RetrievalSource,
) -> Vec<RetrievalResult> {
    hits.into_iter()
        .filter_map(|(id, score)| match corpus.get(id) {
            Some(doc) => Some(RetrievalResult {
                document: doc.text.to_string(),
                similarity_score: score,
                index: doc.id,
                source,
            }),
            None => {
                warn!(id, corpus_len = corpus.len(), "dropping stale document id");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_top_k_orders_by_score_then_id() {
        let ranked = top_k(&[0.2, 0.9, 0.2, 0.5], 3);
        assert_eq!(ranked, vec![(1, 0.9), (3, 0.5), (0, 0.2)]);
    }

    #[test]
    fn test_top_k_never_exceeds_k_or_len() {
        assert_eq!(top_k(&[0.1, 0.2], 5).len(), 2);
        assert!(top_k(&[0.1, 0.2], 0).is_empty());
        assert!(top_k(&[], 3).is_empty());
    }

    #[test]
    fn test_non_finite_scores_rank_as_zero() {
        let ranked = top_k(&[f32::NAN, 0.1], 2);
        assert_eq!(ranked[0], (1, 0.1));
        assert_eq!(ranked[1], (0, 0.0));
    }

    #[test]
    fn test_resolve_hits_drops_stale_ids() {
        let corpus = Corpus::new(vec!["alpha".into(), "beta".into()]);
        let results = resolve_hits(
            &corpus,
            vec![(1, 0.8), (7, 0.5), (0, 0.1)],
            RetrievalSource::Lexical,
        );
        let ids: Vec<DocId> = results.iter().map(|r| r.index).collect();
        assert_eq!(ids, vec![1, 0]);
        assert_eq!(results[0].document, "beta");
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("hybrid".parse::<RetrievalMode>(), Ok(RetrievalMode::Hybrid));
        assert_eq!("TFIDF".parse::<RetrievalMode>(), Ok(RetrievalMode::Lexical));
        assert_eq!("lexical".parse::<RetrievalMode>(), Ok(RetrievalMode::Lexical));
        assert_eq!(" semantic ".parse::<RetrievalMode>(), Ok(RetrievalMode::Semantic));
        assert!("bm25".parse::<RetrievalMode>().is_err());
    }

    #[test]
    fn test_source_serializes_lowercase() {
        let json = serde_json::to_string(&RetrievalSource::Hybrid).unwrap();
        assert_eq!(json, "\"hybrid\"");
    }
}
