//! End-to-end scenarios for the knowledge base
//!
//! Covers ingestion, persistence across instances, retrieval in every mode and
//! classification of drafted answers.

use grounding_core::search::{RetrievalMode, RetrievalResult, RetrievalSource};
use grounding_core::{
    AnswerCategory, EncoderBackend, EngineConfig, GroundednessClassifier, HashingEncoder,
    KnowledgeBase, LazyEncoder, LoadStatus, TextEncoder,
};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;

fn docs(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|t| t.to_string()).collect()
}

fn hashing_kb(config: &EngineConfig) -> KnowledgeBase {
    KnowledgeBase::with_encoder(config, LazyEncoder::ready(Arc::new(HashingEncoder::new(64))))
}

fn hit(document: &str, score: f32) -> RetrievalResult {
    RetrievalResult {
        document: document.to_string(),
        similarity_score: score,
        index: 0,
        source: RetrievalSource::Hybrid,
    }
}

// ============================================================
// Scenarios
// ============================================================

#[test]
fn bond_question_finds_bond_fact() {
    let corpus = docs(&["A bond is a debt security", "A stock is equity ownership"]);

    for kb in [
        KnowledgeBase::new(&EngineConfig::in_memory()),
        hashing_kb(&EngineConfig::in_memory()),
    ] {
        kb.rebuild(corpus.clone());
        let results = kb.retrieve("What is a bond?", 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document, "A bond is a debt security");
        assert_eq!(results[0].index, 0);
    }
}

#[test]
fn never_ingested_corpus() {
    let kb = hashing_kb(&EngineConfig::in_memory());
    for mode in [RetrievalMode::Hybrid, RetrievalMode::Lexical, RetrievalMode::Semantic] {
        assert!(kb.retrieve_with(mode, "anything", 3).is_empty());
    }

    let outcome = kb.classify(&[], "any answer");
    assert_eq!(outcome.category, AnswerCategory::LlmGenerated);
    assert_eq!(outcome.confidence, 0.0);
}

#[test]
fn verbatim_answer_is_grounded() {
    let results = vec![hit("Diversification reduces risk", 0.62)];
    let outcome =
        GroundednessClassifier::default().classify(&results, "Diversification reduces risk");

    assert_eq!(outcome.overlap_percentage, 100.0);
    assert_eq!(outcome.avg_similarity_score, 0.62);
    assert_eq!(outcome.category, AnswerCategory::RagGrounded);
    assert_eq!(outcome.confidence, 0.90);
}

#[test]
fn unrelated_answer_is_llm_generated() {
    let results = vec![hit("Bonds pay interest", 0.05)];
    let outcome = GroundednessClassifier::default()
        .classify(&results, "The market went up today because of unrelated news");

    assert!(outcome.overlap_percentage < 1.0);
    assert_eq!(outcome.avg_similarity_score, 0.05);
    assert_eq!(outcome.category, AnswerCategory::LlmGenerated);
    assert_eq!(outcome.confidence, 0.30);
}

// ============================================================
// Persistence
// ============================================================

#[test]
fn snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::in_memory().with_snapshot_path(dir.path().join("kb.json"));
    let corpus = docs(&[
        "A bond is a debt security",
        "A stock is equity ownership",
        "A bond is a debt security",
    ]);

    let first = hashing_kb(&config);
    let stats = first.rebuild(corpus.clone());
    assert!(stats.persisted);
    assert_eq!(stats.semantic_dimension, Some(64));
    let before = first.retrieve("equity stock", 2);

    let second = hashing_kb(&config);
    let snapshot = second.store().snapshot();
    assert_eq!(snapshot.corpus().texts(), &corpus[..]);
    assert!(snapshot.semantic().is_some());
    let after = second.retrieve("equity stock", 2);
    assert_eq!(
        after.iter().map(|r| (r.index, r.document.as_str())).collect::<Vec<_>>(),
        before.iter().map(|r| (r.index, r.document.as_str())).collect::<Vec<_>>()
    );
    for (a, b) in after.iter().zip(&before) {
        assert!((a.similarity_score - b.similarity_score).abs() < 1e-6);
    }
}

#[test]
fn corrupt_snapshot_is_a_cold_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kb.json");
    std::fs::write(&path, "garbage").unwrap();

    let kb = KnowledgeBase::new(&EngineConfig::in_memory().with_snapshot_path(&path));
    assert!(kb.store().is_empty());
    assert_eq!(kb.reload(), LoadStatus::Discarded);
    assert!(kb.retrieve("bond", 3).is_empty());
}

#[test]
fn snapshot_without_semantic_index_reloads_lexical_only() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::in_memory()
        .with_snapshot_path(dir.path().join("kb.json"))
        .with_encoder(EncoderBackend::Disabled);

    let kb = KnowledgeBase::new(&config);
    kb.rebuild(docs(&["bonds pay interest", "stocks pay dividends"]));

    let reopened = hashing_kb(&config);
    assert!(reopened.store().snapshot().semantic().is_none());
    let results = reopened.retrieve("dividends", 1);
    assert_eq!(results[0].index, 1);
}

/// Hashing vectors under another model's name
struct SwappedModel(HashingEncoder);

impl TextEncoder for SwappedModel {
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
fn snapshot_from_another_encoder_skips_semantic_search() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::in_memory().with_snapshot_path(dir.path().join("kb.json"));
    let corpus = docs(&["bond debt", "stock equity", "cash savings"]);

    let kb = hashing_kb(&config);
    assert_eq!(kb.rebuild(corpus.clone()).semantic_dimension, Some(64));

    let swapped = LazyEncoder::ready(Arc::new(SwappedModel(HashingEncoder::new(64))));
    let reopened = KnowledgeBase::with_encoder(&config, swapped);
    assert_eq!(reopened.store().snapshot().encoder_name(), Some("hashing"));

    assert!(reopened
        .retrieve_with(RetrievalMode::Semantic, "bond debt", 3)
        .is_empty());

    // Hybrid still answers from the lexical side
    let results = reopened.retrieve("bond debt", 3);
    assert_eq!(results[0].index, 0);
    assert_eq!(results[0].document, corpus[0]);
}

// ============================================================
// Degradation and identity
// ============================================================

#[test]
fn failing_encoder_degrades_to_lexical() {
    let encoder = LazyEncoder::new(|| Err(anyhow::anyhow!("model files missing")));
    let kb = KnowledgeBase::with_encoder(&EngineConfig::in_memory(), encoder);
    let stats = kb.rebuild(docs(&["A bond is a debt security", "A stock is equity ownership"]));

    assert_eq!(stats.semantic_dimension, None);
    assert!(kb.retrieve_with(RetrievalMode::Semantic, "bond", 2).is_empty());
    assert_eq!(kb.retrieve("bond", 1)[0].index, 0);
}

#[test]
fn duplicate_documents_keep_their_own_ids() {
    let kb = hashing_kb(&EngineConfig::in_memory());
    kb.rebuild(docs(&[
        "compound interest grows savings",
        "inflation erodes cash",
        "compound interest grows savings",
    ]));

    let results = kb.retrieve("compound interest", 3);
    let ids: HashSet<usize> = results.iter().map(|r| r.index).collect();
    assert_eq!(ids.len(), results.len());
    assert!(ids.contains(&0) && ids.contains(&2));
    assert_eq!(results[0].similarity_score, results[1].similarity_score);
}

#[test]
fn readers_keep_a_consistent_snapshot_during_rebuild() {
    let kb = Arc::new(hashing_kb(&EngineConfig::in_memory()));
    kb.rebuild(docs(&["alpha beta", "beta gamma"]));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let kb = Arc::clone(&kb);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let snapshot = kb.store().snapshot();
                    let n = snapshot.len();
                    assert_eq!(snapshot.lexical().map_or(0, |l| l.len()), n);
                    assert_eq!(snapshot.semantic().map_or(n, |s| s.len()), n);
                    for result in kb.retrieve("beta", 5) {
                        assert!(result.index < 5);
                    }
                }
            })
        })
        .collect();

    for round in 0..20 {
        let texts: Vec<String> = (0..=(round % 5)).map(|i| format!("beta fact {}", i)).collect();
        kb.rebuild(texts);
    }
    for reader in readers {
        reader.join().unwrap();
    }
}
