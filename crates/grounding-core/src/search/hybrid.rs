//! Hybrid search combining lexical and semantic candidates
//!
//! Each side contributes its own top-k candidates. When both sides returned
//! something, the lists are fused (see [`FusionStrategy`]); when only one
//! did, that list is used as is. The surviving ids are then re-scored with a
//! fresh lexical cosine pass so that callers always see lexical-scale
//! similarities whenever a lexical index exists.

use crate::document::DocId;
use crate::embeddings::LazyEncoder;
use crate::search::semantic::search_with;
use crate::search::{FusionStrategy, RetrievalResult, RetrievalSource, Retriever};
use crate::storage::{CorpusSnapshot, CorpusStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Best-available retrieval over the current snapshot
pub struct HybridRetriever {
    store: Arc<CorpusStore>,
    encoder: Arc<LazyEncoder>,
    fusion: FusionStrategy,
}

impl HybridRetriever {
    pub fn new(store: Arc<CorpusStore>, encoder: Arc<LazyEncoder>, fusion: FusionStrategy) -> Self {
        Self {
            store,
            encoder,
            fusion,
        }
    }

    pub fn fusion(&self) -> FusionStrategy {
        self.fusion
    }

    /// Ranked, unique candidate ids for `query` against one snapshot
    fn candidates(&self, snapshot: &CorpusSnapshot, query: &str, k: usize) -> Vec<(DocId, f32)> {
        let lexical = snapshot
            .lexical()
            .map(|index| index.search(query, k))
            .unwrap_or_default();
        let semantic = snapshot
            .semantic()
            .map(|index| search_with(index, snapshot.encoder_name(), &self.encoder, query, k))
            .unwrap_or_default();

        debug!(
            lexical = lexical.len(),
            semantic = semantic.len(),
            "Hybrid candidate lists"
        );

        match (lexical.is_empty(), semantic.is_empty()) {
            (_, true) => lexical,
            (true, false) => semantic,
            (false, false) => self.fusion.fuse(&lexical, &semantic, k),
        }
    }
}

impl Retriever for HybridRetriever {
    fn retrieve(&self, query: &str, k: usize) -> Vec<RetrievalResult> {
        let snapshot = self.store.snapshot();
        if k == 0 || snapshot.is_empty() {
            return Vec::new();
        }

        let candidates = self.candidates(&snapshot, query, k);
        resolve(&snapshot, candidates, query, k)
    }

    fn source(&self) -> RetrievalSource {
        RetrievalSource::Hybrid
    }
}

/// Turn ranked candidate ids into at most `k` results.
///
/// Repeated ids and ids the snapshot does not hold are skipped. Scores are
/// the fresh lexical cosine when a lexical index exists, else the
/// candidate's own score.
fn resolve(
    snapshot: &CorpusSnapshot,
    candidates: Vec<(DocId, f32)>,
    query: &str,
    k: usize,
) -> Vec<RetrievalResult> {
    let query_vec = snapshot.lexical().map(|index| index.query_vector(query));
    let corpus = snapshot.corpus();

    let mut seen = Vec::with_capacity(candidates.len());
    let mut results = Vec::with_capacity(candidates.len().min(k));
    for (id, fallback) in candidates {
        if results.len() == k {
            break;
        }
        if seen.contains(&id) {
            continue;
        }
        let Some(doc) = corpus.get(id) else {
            warn!(id, corpus_len = corpus.len(), "dropping stale document id");
            continue;
        };
        let score = match (snapshot.lexical(), &query_vec) {
            (Some(index), Some(qv)) => match index.similarity(qv, id) {
                Some(score) => score,
                None => {
                    warn!(id, "document id missing from lexical index");
                    continue;
                }
            },
            _ => fallback,
        };
        seen.push(id);
        results.push(RetrievalResult {
            document: doc.text.to_string(),
            similarity_score: score,
            index: id,
            source: RetrievalSource::Hybrid,
        });
    }
    results
}
