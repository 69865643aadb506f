//! Knowledge base facade
//!
//! Wires one encoder handle, one corpus store and the three retrievers
//! together so callers do not have to share the `Arc`s themselves.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::embeddings::LazyEncoder;
use crate::search::{
    HybridRetriever, LexicalRetriever, RetrievalMode, RetrievalResult, Retriever,
    SemanticRetriever,
};
use crate::storage::{CorpusStore, LoadStatus, RebuildStats};
use crate::verifier::{GroundednessClassifier, VerificationOutcome};

/// A corpus, its retrievers and a groundedness classifier
pub struct KnowledgeBase {
    store: Arc<CorpusStore>,
    encoder: Arc<LazyEncoder>,
    lexical: LexicalRetriever,
    semantic: SemanticRetriever,
    hybrid: HybridRetriever,
    classifier: GroundednessClassifier,
    default_k: usize,
}

impl KnowledgeBase {
    /// Build a knowledge base from `config` and load its snapshot, if any.
    ///
    /// The encoder is not loaded here; it is loaded on first use.
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_encoder(config, LazyEncoder::from_config(&config.encoder))
    }

    /// Same as [`new`](Self::new) with an explicitly injected encoder handle
    pub fn with_encoder(config: &EngineConfig, encoder: LazyEncoder) -> Self {
        let encoder = Arc::new(encoder);
        let store = Arc::new(CorpusStore::open(config, Arc::clone(&encoder)));

        Self {
            lexical: LexicalRetriever::new(Arc::clone(&store)),
            semantic: SemanticRetriever::new(Arc::clone(&store), Arc::clone(&encoder)),
            hybrid: HybridRetriever::new(Arc::clone(&store), Arc::clone(&encoder), config.fusion),
            classifier: GroundednessClassifier::default(),
            default_k: config.default_k,
            store,
            encoder,
        }
    }

    pub fn with_classifier(mut self, classifier: GroundednessClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn store(&self) -> &Arc<CorpusStore> {
        &self.store
    }

    pub fn encoder(&self) -> &Arc<LazyEncoder> {
        &self.encoder
    }

    pub fn classifier(&self) -> &GroundednessClassifier {
        &self.classifier
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// Replace the corpus; see [`CorpusStore::rebuild`]
    pub fn rebuild(&self, documents: Vec<String>) -> RebuildStats {
        self.store.rebuild(documents)
    }

    /// Re-read the persisted snapshot
    pub fn reload(&self) -> LoadStatus {
        self.store.load()
    }

    /// Hybrid retrieval
    pub fn retrieve(&self, query: &str, k: usize) -> Vec<RetrievalResult> {
        self.hybrid.retrieve(query, k)
    }

    pub fn retrieve_with(
        &self,
        mode: RetrievalMode,
        query: &str,
        k: usize,
    ) -> Vec<RetrievalResult> {
        self.retriever(mode).retrieve(query, k)
    }

    pub fn retriever(&self, mode: RetrievalMode) -> &dyn Retriever {
        match mode {
            RetrievalMode::Hybrid => &self.hybrid,
            RetrievalMode::Lexical => &self.lexical,
            RetrievalMode::Semantic => &self.semantic,
        }
    }

    pub fn classify(&self, results: &[RetrievalResult], answer: &str) -> VerificationOutcome {
        self.classifier.classify(results, answer)
    }

    /// Retrieve the default number of sources for `query` and classify `answer` against them
    pub fn verify(&self, query: &str, answer: &str) -> VerificationOutcome {
        let results = self.retrieve(query, self.default_k);
        self.classify(&results, answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEncoder;
    use crate::search::RetrievalSource;
    use crate::verifier::AnswerCategory;
    use pretty_assertions::assert_eq;

    fn finance_docs() -> Vec<String> {
        vec![
            "A bond is a debt security".to_string(),
            "A stock is equity ownership".to_string(),
            "Diversification reduces risk".to_string(),
        ]
    }

    #[test]
    fn test_modes_tag_their_source() {
        let kb = KnowledgeBase::with_encoder(
            &EngineConfig::in_memory(),
            LazyEncoder::ready(Arc::new(HashingEncoder::new(64))),
        );
        kb.rebuild(finance_docs());

        for (mode, source) in [
            (RetrievalMode::Hybrid, RetrievalSource::Hybrid),
            (RetrievalMode::Lexical, RetrievalSource::Lexical),
            (RetrievalMode::Semantic, RetrievalSource::Semantic),
        ] {
            let results = kb.retrieve_with(mode, "bond debt", 2);
            assert_eq!(results.len(), 2, "{:?}", mode);
            assert!(results.iter().all(|r| r.source == source));
            assert_eq!(kb.retriever(mode).source(), source);
        }
    }

    #[test]
    fn test_semantic_mode_without_encoder_is_empty() {
        let kb = KnowledgeBase::new(&EngineConfig::in_memory());
        kb.rebuild(finance_docs());
        assert!(kb.retrieve_with(RetrievalMode::Semantic, "bond", 3).is_empty());
        assert_eq!(kb.retrieve("bond", 3).len(), 3);
    }

    #[test]
    fn test_verify_uses_default_k() {
        let kb = KnowledgeBase::new(&EngineConfig::in_memory());
        kb.rebuild(finance_docs());

        let outcome = kb.verify("Diversification risk", "Diversification reduces risk");
        assert_eq!(outcome.sources.len(), kb.default_k());
        assert_eq!(outcome.sources[0].document, "Diversification reduces risk");
    }

    #[test]
    fn test_verify_on_empty_corpus() {
        let kb = KnowledgeBase::new(&EngineConfig::in_memory());
        let outcome = kb.verify("anything", "any answer");
        assert_eq!(outcome.category, AnswerCategory::LlmGenerated);
        assert_eq!(outcome.confidence, 0.0);
    }
}
