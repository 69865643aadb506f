//! Semantic search over dense sentence embeddings
//!
//! Every row of the [`DenseIndex`] is L2-normalised when it is built, and
//! query vectors are normalised the same way, so the dot product is the
//! cosine similarity.
//!
//! Semantic search is useful for:
//! - Matching paraphrases that share no keywords with the query
//! - Ranking short knowledge snippets by meaning rather than term overlap

use crate::document::DocId;
use crate::embeddings::{LazyEncoder, TextEncoder};
use crate::search::{resolve_hits, top_k, RetrievalResult, RetrievalSource, Retriever};
use crate::storage::CorpusStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors raised while building or validating a dense index
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    /// The encoder failed on the corpus
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// A vector does not have the index dimension
    #[error("Row {row} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Row count differs from the number of documents
    #[error("Index has {rows} rows for {documents} documents")]
    Misaligned { rows: usize, documents: usize },
}

/// One normalised embedding per document, aligned by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseIndex {
    dimension: usize,
    rows: Vec<Vec<f32>>,
}

impl DenseIndex {
    /// Encode every document with `encoder`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The encoder fails on any document
    /// - The encoder returns a vector of the wrong dimension
    /// - The encoder returns a different number of vectors than documents
    pub fn build(encoder: &dyn TextEncoder, documents: &[String]) -> Result<Self, IndexError> {
        let texts: Vec<&str> = documents.iter().map(String::as_str).collect();
        let rows = encoder
            .embed_batch(&texts)
            .map_err(|e| IndexError::Encoding(e.to_string()))?;
        if rows.len() != documents.len() {
            return Err(IndexError::Misaligned {
                rows: rows.len(),
                documents: documents.len(),
            });
        }
        Self::from_rows(encoder.dimension(), rows)
    }

    /// Wrap pre-computed vectors, normalising each row
    pub fn from_rows(dimension: usize, mut rows: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        for (row, vector) in rows.iter_mut().enumerate() {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    row,
                    expected: dimension,
                    found: vector.len(),
                });
            }
            normalize(vector);
        }
        Ok(Self { dimension, rows })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check the dimension of every row, e.g. after deserialisation
    pub fn validate(&self) -> Result<(), IndexError> {
        match self.rows.iter().position(|r| r.len() != self.dimension) {
            Some(row) => Err(IndexError::DimensionMismatch {
                row,
                expected: self.dimension,
                found: self.rows[row].len(),
            }),
            None => Ok(()),
        }
    }

    /// Dot product of a normalised query against every row
    pub fn similarities(&self, query: &[f32]) -> Vec<f32> {
        self.rows.iter().map(|row| dot(row, query)).collect()
    }

    /// Top `k` rows for an already-encoded query
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(DocId, f32)> {
        if k == 0 || query.len() != self.dimension {
            return Vec::new();
        }
        top_k(&self.similarities(query), k)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Encode `query` and rank it against `index`; empty on any encoder problem.
///
/// `built_with` is the name of the encoder that produced the index rows. A
/// query encoder with another name lives in a different vector space, even
/// when the dimensions agree, so nothing is returned.
pub(crate) fn search_with(
    index: &DenseIndex,
    built_with: Option<&str>,
    encoder: &LazyEncoder,
    query: &str,
    k: usize,
) -> Vec<(DocId, f32)> {
    if k == 0 || index.is_empty() {
        return Vec::new();
    }
    let Some(encoder) = encoder.get() else {
        return Vec::new();
    };
    if let Some(built_with) = built_with {
        if built_with != encoder.name() {
            warn!(
                index_encoder = built_with,
                query_encoder = encoder.name(),
                "Semantic index was built by a different encoder, skipping semantic search"
            );
            return Vec::new();
        }
    }
    match encoder.embed(query) {
        Ok(mut query_vec) => {
            if query_vec.len() != index.dimension() {
                warn!(
                    encoder = encoder.name(),
                    expected = index.dimension(),
                    found = query_vec.len(),
                    "Query embedding dimension does not match the semantic index"
                );
                return Vec::new();
            }
            normalize(&mut query_vec);
            index.search(&query_vec, k)
        }
        Err(e) => {
            warn!(error = %e, "Failed to encode query, skipping semantic search");
            Vec::new()
        }
    }
}

/// Nearest-neighbour search over the semantic index of the current snapshot
pub struct SemanticRetriever {
    store: Arc<CorpusStore>,
    encoder: Arc<LazyEncoder>,
}

impl SemanticRetriever {
    pub fn new(store: Arc<CorpusStore>, encoder: Arc<LazyEncoder>) -> Self {
        Self { store, encoder }
    }
}

impl Retriever for SemanticRetriever {
    fn retrieve(&self, query: &str, k: usize) -> Vec<RetrievalResult> {
        let snapshot = self.store.snapshot();
        let Some(index) = snapshot.semantic() else {
            return Vec::new();
        };
        let hits = search_with(index, snapshot.encoder_name(), &self.encoder, query, k);
        resolve_hits(snapshot.corpus(), hits, RetrievalSource::Semantic)
    }

    fn source(&self) -> RetrievalSource {
        RetrievalSource::Semantic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEncoder;
    use pretty_assertions::assert_eq;

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_from_rows_normalizes() {
        let index = DenseIndex::from_rows(2, vec![vec![3.0, 4.0], vec![0.0, 2.0]]).unwrap();
        assert_eq!(index.similarities(&[0.0, 1.0]), vec![0.8, 1.0]);
    }

    #[test]
    fn test_from_rows_rejects_wrong_dimension() {
        let err = DenseIndex::from_rows(3, vec![vec![1.0, 0.0, 0.0], vec![1.0]]).unwrap_err();
        assert_eq!(
            err,
            IndexError::DimensionMismatch {
                row: 1,
                expected: 3,
                found: 1
            }
        );
    }

    #[test]
    fn test_search_orders_and_breaks_ties_by_id() {
        let index = DenseIndex::from_rows(
            2,
            vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]],
        )
        .unwrap();
        let hits = index.search(&[1.0, 0.0], 3);
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![1, 2, 0]);
    }

    #[test]
    fn test_search_rejects_wrong_query_dimension() {
        let index = DenseIndex::from_rows(2, vec![vec![1.0, 0.0]]).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 1).is_empty());
    }

    #[test]
    fn test_build_with_hashing_encoder() {
        let encoder = HashingEncoder::new(64);
        let index = DenseIndex::build(&encoder, &docs(&["bond yield", "stock equity"])).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), 64);
        assert!(index.validate().is_ok());
    }

    #[test]
    fn test_search_with_unavailable_encoder_is_empty() {
        let encoder = HashingEncoder::new(16);
        let index = DenseIndex::build(&encoder, &docs(&["bond"])).unwrap();
        assert!(search_with(&index, None, &LazyEncoder::unavailable(), "bond", 1).is_empty());
    }

    #[test]
    fn test_search_with_dimension_mismatch_is_empty() {
        let index = DenseIndex::build(&HashingEncoder::new(16), &docs(&["bond"])).unwrap();
        let other = LazyEncoder::ready(Arc::new(HashingEncoder::new(32)));
        assert!(search_with(&index, None, &other, "bond", 1).is_empty());
    }

    /// Same dimension, different name: stands in for a model swap
    struct RenamedEncoder(HashingEncoder);

    impl TextEncoder for RenamedEncoder {
        fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.0.embed(text)
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }

        fn name(&self) -> &str {
            "other-model"
        }
    }

    #[test]
    fn test_search_with_foreign_encoder_is_empty() {
        let documents = docs(&["bond debt", "stock equity", "cash savings"]);
        let index = DenseIndex::build(&HashingEncoder::new(64), &documents).unwrap();
        let other = LazyEncoder::ready(Arc::new(RenamedEncoder(HashingEncoder::new(64))));

        assert!(search_with(&index, Some("hashing"), &other, "bond debt", 3).is_empty());
        // Unknown provenance falls back to the dimension check only
        assert_eq!(search_with(&index, None, &other, "bond debt", 3).len(), 3);
    }

    #[test]
    fn test_search_with_matching_encoder() {
        let documents = docs(&["bond debt", "stock equity"]);
        let index = DenseIndex::build(&HashingEncoder::new(64), &documents).unwrap();
        let same = LazyEncoder::ready(Arc::new(HashingEncoder::new(64)));

        let hits = search_with(&index, Some("hashing"), &same, "bond debt", 1);
        assert_eq!(hits[0].0, 0);
    }

    #[test]
    fn test_validate_detects_corrupt_rows() {
        let index = DenseIndex {
            dimension: 2,
            rows: vec![vec![1.0, 0.0], vec![1.0]],
        };
        assert!(index.validate().is_err());
    }
}
