//! Confidence tiers for groundedness classification
//!
//! Tiers are evaluated from strictest to most lenient and the first match
//! wins:
//! - Grounded (similarity > 0.50, overlap > 0.25): confidence 0.90
//! - Informed (similarity > 0.35, overlap > 0.15): confidence 0.70
//! - Partially matched (similarity > 0.20, overlap > 0.10): confidence 0.50
//! - Otherwise LLM generated: confidence 0.30
//!
//! Both bounds are strict. The last tier has no threshold, so every
//! (similarity, overlap) pair selects exactly one tier.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AnswerCategory;

/// Number of tiers a valid configuration has
pub const TIER_COUNT: usize = 4;

/// Errors raised when validating a tier configuration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TierError {
    #[error("Expected {expected} tiers, found {found}")]
    Count { expected: usize, found: usize },

    #[error("Tier {position} must be {expected}, found {found}")]
    Order {
        position: usize,
        expected: AnswerCategory,
        found: AnswerCategory,
    },

    #[error("Tier {0} needs a threshold")]
    MissingThreshold(AnswerCategory),

    #[error("The last tier ({0}) must not have a threshold")]
    CatchAllThreshold(AnswerCategory),

    #[error("Tier {category} has a non-finite threshold")]
    NonFinite { category: AnswerCategory },

    #[error("Tier {category} is more lenient on {field} than a tier below it")]
    NotMonotonic {
        category: AnswerCategory,
        field: &'static str,
    },

    #[error("Tier {category} has confidence {confidence} outside [0, 1]")]
    ConfidenceRange {
        category: AnswerCategory,
        confidence: f64,
    },
}

/// Strict lower bounds a result set has to exceed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub min_similarity: f64,
    pub min_overlap: f64,
}

impl Threshold {
    pub fn new(min_similarity: f64, min_overlap: f64) -> Self {
        Self {
            min_similarity,
            min_overlap,
        }
    }

    pub fn admits(&self, avg_similarity: f64, overlap: f64) -> bool {
        avg_similarity > self.min_similarity && overlap > self.min_overlap
    }

    fn is_finite(&self) -> bool {
        self.min_similarity.is_finite() && self.min_overlap.is_finite()
    }
}

/// One classification tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub category: AnswerCategory,
    /// `None` only for the catch-all tier
    pub threshold: Option<Threshold>,
    pub confidence: f64,
    pub warning: String,
    pub recommendation: String,
}

impl Tier {
    fn new(
        category: AnswerCategory,
        threshold: Option<Threshold>,
        confidence: f64,
        warning: &str,
        recommendation: &str,
    ) -> Self {
        Self {
            category,
            threshold,
            confidence,
            warning: warning.to_string(),
            recommendation: recommendation.to_string(),
        }
    }

    fn admits(&self, avg_similarity: f64, overlap: f64) -> bool {
        self.threshold
            .map_or(true, |t| t.admits(avg_similarity, overlap))
    }
}

/// Validated, ordered set of classification tiers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationTiers {
    tiers: Vec<Tier>,
}

impl ClassificationTiers {
    /// Validate `tiers` and build the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - There are not exactly four tiers, in strictest-first category order
    /// - Any tier but the last lacks a threshold, or the last one has one
    /// - A threshold is non-finite or looser than the tier after it
    /// - A confidence is outside `[0, 1]` or higher than the tier before it
    pub fn new(tiers: Vec<Tier>) -> Result<Self, TierError> {
        if tiers.len() != TIER_COUNT {
            return Err(TierError::Count {
                expected: TIER_COUNT,
                found: tiers.len(),
            });
        }

        for (position, (tier, expected)) in tiers.iter().zip(AnswerCategory::ALL).enumerate() {
            if tier.category != expected {
                return Err(TierError::Order {
                    position,
                    expected,
                    found: tier.category,
                });
            }
            if !(0.0..=1.0).contains(&tier.confidence) {
                return Err(TierError::ConfidenceRange {
                    category: tier.category,
                    confidence: tier.confidence,
                });
            }
            let is_last = position == TIER_COUNT - 1;
            match (&tier.threshold, is_last) {
                (None, false) => return Err(TierError::MissingThreshold(tier.category)),
                (Some(_), true) => return Err(TierError::CatchAllThreshold(tier.category)),
                (Some(t), false) if !t.is_finite() => {
                    return Err(TierError::NonFinite {
                        category: tier.category,
                    })
                }
                _ => {}
            }
        }

        for pair in tiers.windows(2) {
            let (stricter, looser) = (&pair[0], &pair[1]);
            if looser.confidence > stricter.confidence {
                return Err(TierError::NotMonotonic {
                    category: stricter.category,
                    field: "confidence",
                });
            }
            if let (Some(s), Some(l)) = (stricter.threshold, looser.threshold) {
                if s.min_similarity < l.min_similarity {
                    return Err(TierError::NotMonotonic {
                        category: stricter.category,
                        field: "similarity",
                    });
                }
                if s.min_overlap < l.min_overlap {
                    return Err(TierError::NotMonotonic {
                        category: stricter.category,
                        field: "overlap",
                    });
                }
            }
        }

        Ok(Self { tiers })
    }

    /// First tier admitting the pair, strictest first
    pub fn select(&self, avg_similarity: f64, overlap: f64) -> &Tier {
        self.tiers
            .iter()
            .find(|tier| tier.admits(avg_similarity, overlap))
            .unwrap_or_else(|| self.catch_all())
    }

    pub fn catch_all(&self) -> &Tier {
        &self.tiers[TIER_COUNT - 1]
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }
}

impl Default for ClassificationTiers {
    fn default() -> Self {
        Self {
            tiers: vec![
                Tier::new(
                    AnswerCategory::RagGrounded,
                    Some(Threshold::new(0.50, 0.25)),
                    0.90,
                    "High confidence: answer grounded in trusted knowledge sources",
                    "Trust this answer; it comes from verified knowledge",
                ),
                Tier::new(
                    AnswerCategory::RagInformed,
                    Some(Threshold::new(0.35, 0.15)),
                    0.70,
                    "Medium confidence: answer based on trusted sources with some interpretation",
                    "Answer is based on trusted sources but includes interpretation. \
                     Verify for important decisions.",
                ),
                Tier::new(
                    AnswerCategory::RagPartiallyMatched,
                    Some(Threshold::new(0.20, 0.10)),
                    0.50,
                    "Low-medium confidence: partial match with trusted sources, \
                     some generated content",
                    "Answer is partially grounded in trusted sources. \
                     Consider additional research.",
                ),
                Tier::new(
                    AnswerCategory::LlmGenerated,
                    None,
                    0.30,
                    "Low confidence: answer may not be grounded in trusted sources",
                    "Answer is not from verified sources. \
                     Independently verify before using for decisions.",
                ),
            ],
        }
    }
}
