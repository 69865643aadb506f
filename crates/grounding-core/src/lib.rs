//! Grounding Core - hybrid retrieval over a curated corpus and groundedness
//! classification of answers drafted from it
//!
//! This crate provides:
//! - Corpus store with atomically swapped snapshots and JSON persistence
//! - Lexical (TF-IDF), semantic (dense embeddings) and hybrid retrievers
//! - Embedding model integration (Candle) behind a lazily loaded encoder handle
//! - Groundedness classification with validated confidence tiers
//! - Configuration management
//!
//! # Example
//!
//! ```
//! use grounding_core::{EngineConfig, KnowledgeBase, AnswerCategory};
//!
//! let kb = KnowledgeBase::new(&EngineConfig::in_memory());
//! kb.rebuild(vec![
//!     "A bond is a debt security".to_string(),
//!     "A stock is equity ownership".to_string(),
//! ]);
//!
//! let results = kb.retrieve("What is a bond?", 1);
//! assert_eq!(results[0].document, "A bond is a debt security");
//!
//! let outcome = kb.classify(&results, "A bond is a debt security");
//! assert_eq!(outcome.category, AnswerCategory::RagGrounded);
//! ```

pub mod config;
pub mod document;
pub mod embeddings;
pub mod engine;
pub mod search;
pub mod storage;
pub mod verifier;

// Re-export commonly used types
pub use config::{EncoderBackend, EncoderConfig, EngineConfig};
pub use document::{Corpus, DocId, Document};
pub use embeddings::{EmbeddingModel, HashingEncoder, LazyEncoder, TextEncoder};
pub use engine::KnowledgeBase;
pub use search::{
    FusionStrategy, HybridRetriever, LexicalRetriever, RetrievalMode, RetrievalResult,
    RetrievalSource, Retriever, SemanticRetriever,
};
pub use storage::{CorpusSnapshot, CorpusStore, LoadStatus, RebuildStats, SnapshotError};
pub use verifier::{
    AnswerCategory, ClassificationTiers, GroundednessClassifier, TierError, VerificationOutcome,
};
