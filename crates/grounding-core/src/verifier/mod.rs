//! Groundedness classification of generated answers
//!
//! Given the results a retriever returned and the answer that was drafted
//! from them, the [`GroundednessClassifier`] measures:
//! - average similarity of the retrieved results
//! - word overlap: the share of the answer's distinct lowercase words that
//!   occur in any retrieved document
//!
//! and maps the pair to one of four [`AnswerCategory`] tiers.

mod report;
mod tiers;

pub use report::{render_report, VerificationReport};
pub use tiers::{ClassificationTiers, Threshold, Tier, TierError, TIER_COUNT};

use crate::search::RetrievalResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Warning attached when nothing was retrieved
pub const NO_SOURCES_WARNING: &str = "no supporting documents found";

/// Recommendation attached when nothing was retrieved
pub const NO_SOURCES_RECOMMENDATION: &str = "verify independently";

/// How well an answer is backed by retrieved evidence.
///
/// Variants are ordered from least to most grounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerCategory {
    LlmGenerated,
    RagPartiallyMatched,
    RagInformed,
    RagGrounded,
}

impl AnswerCategory {
    /// Every category, strictest first
    pub const ALL: [AnswerCategory; 4] = [
        AnswerCategory::RagGrounded,
        AnswerCategory::RagInformed,
        AnswerCategory::RagPartiallyMatched,
        AnswerCategory::LlmGenerated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerCategory::RagGrounded => "RAG_GROUNDED",
            AnswerCategory::RagInformed => "RAG_INFORMED",
            AnswerCategory::RagPartiallyMatched => "RAG_PARTIALLY_MATCHED",
            AnswerCategory::LlmGenerated => "LLM_GENERATED",
        }
    }
}

impl fmt::Display for AnswerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub category: AnswerCategory,
    pub confidence: f64,
    /// Word overlap in percent, one decimal place
    pub overlap_percentage: f64,
    /// Mean similarity of the sources, three decimal places
    pub avg_similarity_score: f64,
    pub sources: Vec<RetrievalResult>,
    pub warning: String,
    pub recommendation: String,
}

/// Stateless classifier over a validated tier configuration
#[derive(Debug, Clone, Default)]
pub struct GroundednessClassifier {
    tiers: ClassificationTiers,
}

impl GroundednessClassifier {
    pub fn new(tiers: ClassificationTiers) -> Self {
        Self { tiers }
    }

    pub fn tiers(&self) -> &ClassificationTiers {
        &self.tiers
    }

    /// Classify `answer` against the `results` it was drafted from
    pub fn classify(&self, results: &[RetrievalResult], answer: &str) -> VerificationOutcome {
        if results.is_empty() {
            return VerificationOutcome {
                category: AnswerCategory::LlmGenerated,
                confidence: 0.0,
                overlap_percentage: 0.0,
                avg_similarity_score: 0.0,
                sources: Vec::new(),
                warning: NO_SOURCES_WARNING.to_string(),
                recommendation: NO_SOURCES_RECOMMENDATION.to_string(),
            };
        }

        let avg_similarity = mean_similarity(results);
        let overlap = word_overlap(answer, results.iter().map(|r| r.document.as_str()));
        let tier = self.tiers.select(avg_similarity, overlap);

        VerificationOutcome {
            category: tier.category,
            confidence: tier.confidence,
            overlap_percentage: round_to(overlap * 100.0, 1),
            avg_similarity_score: round_to(avg_similarity, 3),
            sources: results.to_vec(),
            warning: tier.warning.clone(),
            recommendation: tier.recommendation.clone(),
        }
    }
}

/// Mean of the similarity scores; 0 for no results
pub fn mean_similarity(results: &[RetrievalResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let total: f64 = results.iter().map(|r| r.similarity_score as f64).sum();
    total / results.len() as f64
}

/// Share of the answer's distinct words found in any of `documents`.
///
/// Words are whitespace-separated and lowercased; an empty answer has no
/// overlap.
pub fn word_overlap<'a>(answer: &str, documents: impl IntoIterator<Item = &'a str>) -> f64 {
    let answer_words = word_set(answer);
    if answer_words.is_empty() {
        return 0.0;
    }
    let document_words: HashSet<String> = documents.into_iter().flat_map(word_set).collect();
    let shared = answer_words
        .iter()
        .filter(|w| document_words.contains(*w))
        .count();
    shared as f64 / answer_words.len() as f64
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
