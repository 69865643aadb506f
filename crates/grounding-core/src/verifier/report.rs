//! Markdown rendering of a verification outcome

use chrono::{DateTime, TimeZone};
use std::fmt;

use super::VerificationOutcome;

/// Characters of each source shown in the report
const PREVIEW_CHARS: usize = 100;

/// Markdown view of an answer and its verification block.
///
/// Implements [`fmt::Display`], so it can be written into any
/// [`fmt::Write`] sink or turned into a `String` with `to_string`.
pub struct VerificationReport<'a, Tz: TimeZone> {
    pub answer: &'a str,
    pub outcome: &'a VerificationOutcome,
    pub verified_at: DateTime<Tz>,
}

impl<Tz> fmt::Display for VerificationReport<'_, Tz>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = self.outcome;

        writeln!(f, "{}", self.answer)?;
        writeln!(f)?;
        writeln!(f, "---")?;
        writeln!(f)?;
        writeln!(f, "**ANSWER VERIFICATION**")?;
        writeln!(f, "- **Source Type:** {}", outcome.category)?;
        writeln!(f, "- **Confidence:** {:.0}%", outcome.confidence * 100.0)?;
        writeln!(f, "- **Status:** {}", outcome.warning)?;
        writeln!(f)?;

        if !outcome.sources.is_empty() {
            writeln!(f, "**Match Score:** {}", outcome.avg_similarity_score)?;
            writeln!(f)?;
            writeln!(f, "**Supporting Sources:**")?;
            for (i, source) in outcome.sources.iter().enumerate() {
                writeln!(f, "{}. _{}..._", i + 1, preview(&source.document))?;
                writeln!(
                    f,
                    "   (Similarity: {:.2}%)",
                    source.similarity_score as f64 * 100.0
                )?;
                writeln!(f)?;
            }
        }

        writeln!(f, "**Recommendation:** {}", outcome.recommendation)?;
        write!(
            f,
            "_Verified at: {}_",
            self.verified_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Render `answer` followed by its verification block.
///
/// # Example
///
/// ```
/// use chrono::Local;
/// use grounding_core::verifier::{render_report, GroundednessClassifier};
///
/// let outcome = GroundednessClassifier::default().classify(&[], "Stocks always go up");
/// let report = render_report("Stocks always go up", &outcome, Local::now());
/// assert!(report.contains("LLM_GENERATED"));
/// ```
pub fn render_report<Tz>(
    answer: &str,
    outcome: &VerificationOutcome,
    verified_at: DateTime<Tz>,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    VerificationReport {
        answer,
        outcome,
        verified_at,
    }
    .to_string()
}

fn preview(document: &str) -> String {
    document
        .chars()
        .take(PREVIEW_CHARS)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect()
}
