//! Personality Analysis
//!
//! Pattern-based personality profiling from a single message, enriched with
//! the user's stored history. Four axes come out of phrase-pattern scoring:
//! communication style, traits, decision style, and confidence level.
//!
//! This is deliberately shallow language analysis: phrase tables plus
//! message-shape heuristics. The depth comes from accumulation; every
//! result persists as a vector fact and feeds the historical comparison on
//! the next turn.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::memory::DocType;
use crate::optimize::MemoryOptimizer;
use crate::pipeline::AnalysisError;

// ============================================================================
// PATTERN TABLES
// ============================================================================

const FORMAL_PATTERNS: &[&str] = &[
    "please consider",
    "thank you for",
    "i would appreciate",
    "could you kindly",
    "i respectfully",
    "may i suggest",
];

const CASUAL_PATTERNS: &[&str] = &[
    "hey", "yeah", "cool", "awesome", "no worries", "sounds good", "for sure", "totally",
];

const ANALYTICAL_PATTERNS: &[&str] = &[
    "because",
    "therefore",
    "however",
    "analysis shows",
    "data indicates",
    "logically",
    "systematically",
];

const EXPRESSIVE_PATTERNS: &[&str] = &[
    "i feel",
    "emotionally",
    "passionate about",
    "excited",
    "frustrated",
    "thrilled",
    "deeply",
];

const CURIOUS_PATTERNS: &[&str] = &[
    "why", "how", "what if", "i wonder", "explore", "learn more", "understand better",
];

const SUPPORTIVE_PATTERNS: &[&str] = &[
    "help", "support", "encourage", "here for you", "understand", "care about",
];

const CREATIVE_PATTERNS: &[&str] = &[
    "imagine", "creative", "artistic", "innovative", "brainstorm", "design", "inspiration",
];

const PRACTICAL_PATTERNS: &[&str] = &[
    "practical", "realistic", "efficient", "useful", "implemented", "actionable", "concrete",
];

const DELIBERATE_PATTERNS: &[&str] = &[
    "think about",
    "consider options",
    "weigh pros and cons",
    "analyze carefully",
    "take time",
];

const INTUITIVE_PATTERNS: &[&str] = &[
    "feel right", "gut instinct", "intuitively", "sense that", "naturally",
];

const HIGH_CONFIDENCE_PATTERNS: &[&str] = &[
    "i'm confident", "definitely", "certainly", "absolutely", "without doubt", "i know",
];

const TENTATIVE_PATTERNS: &[&str] = &[
    "i think", "maybe", "perhaps", "might be", "possibly", "not sure but",
];

/// Query used to pull personality history from memory
const HISTORY_QUERY: &str = "communication style personality behavior preferences";

/// Pattern score below which a style reads as mixed
const STYLE_THRESHOLD: f64 = 0.3;

/// Pattern score above which a trait registers
const TRAIT_THRESHOLD: f64 = 0.2;

// ============================================================================
// TYPES
// ============================================================================

/// Historical consistency signals mined from stored personality facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalPatterns {
    /// How many personality memories exist for the user
    pub pattern_count: usize,
    /// Tendency scores over the combined history text
    pub formal_tendency: f64,
    pub casual_tendency: f64,
    /// "formal" or "casual", whichever dominates the history
    pub dominant_style: String,
}

/// Personality profile extracted from one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalityAnalysis {
    /// Dominant communication style ("formal", "casual", "analytical",
    /// "expressive", or "adaptive" when mixed)
    pub communication_style: String,
    /// Detected traits, strongest first, at most five
    pub traits: Vec<String>,
    /// "analytical", "intuitive", or "balanced"
    pub decision_style: String,
    /// "confident", "thoughtful", or "moderate"
    pub confidence_level: String,
    /// History-derived consistency signals, when memory was reachable
    pub historical: Option<HistoricalPatterns>,
    /// Confidence in this analysis, `[0, 1]`
    pub analysis_confidence: f64,
}

// ============================================================================
// ANALYZER
// ============================================================================

/// Pattern-based personality analyzer backed by memory search
pub struct PersonalityAnalyzer {
    optimizer: Arc<MemoryOptimizer>,
}

impl PersonalityAnalyzer {
    /// Create an analyzer over the shared memory optimizer
    pub fn new(optimizer: Arc<MemoryOptimizer>) -> Self {
        Self { optimizer }
    }

    /// Analyze a message, folding in the user's stored history.
    ///
    /// The history search is part of the analysis; if memory is down the
    /// branch fails and the pipeline degrades the slot.
    pub async fn analyze(
        &self,
        user_id: &str,
        message: &str,
    ) -> Result<PersonalityAnalysis, AnalysisError> {
        let history = self
            .optimizer
            .search(
                HISTORY_QUERY,
                Some(user_id),
                20,
                Some(&[DocType::Personality]),
            )
            .await
            .map_err(|e| AnalysisError(e.to_string()))?;

        let historical = if history.is_empty() {
            None
        } else {
            let combined: String = history
                .iter()
                .map(|hit| hit.content.to_lowercase())
                .collect::<Vec<_>>()
                .join(" ");
            let formal = pattern_score(&combined, FORMAL_PATTERNS);
            let casual = pattern_score(&combined, CASUAL_PATTERNS);
            Some(HistoricalPatterns {
                pattern_count: history.len(),
                formal_tendency: formal,
                casual_tendency: casual,
                dominant_style: if formal > casual { "formal" } else { "casual" }.to_string(),
            })
        };

        let analysis = Self::analyze_message(message, historical);
        debug!(
            user_id,
            style = %analysis.communication_style,
            traits = analysis.traits.len(),
            "personality analysis complete"
        );
        Ok(analysis)
    }

    /// Pure message analysis, usable without memory access.
    pub fn analyze_message(
        message: &str,
        historical: Option<HistoricalPatterns>,
    ) -> PersonalityAnalysis {
        let lowered = message.to_lowercase();

        PersonalityAnalysis {
            communication_style: Self::communication_style(message, &lowered),
            traits: Self::traits(message, &lowered),
            decision_style: Self::decision_style(&lowered),
            confidence_level: Self::confidence_level(message, &lowered),
            historical,
            analysis_confidence: 0.8,
        }
    }

    fn communication_style(message: &str, lowered: &str) -> String {
        let mut formal = pattern_score(lowered, FORMAL_PATTERNS);
        let mut casual = pattern_score(lowered, CASUAL_PATTERNS);
        let mut analytical = pattern_score(lowered, ANALYTICAL_PATTERNS);
        let mut expressive = pattern_score(lowered, EXPRESSIVE_PATTERNS);

        // Message shape nudges the scores: long messages read analytical,
        // short ones casual, questions both ways
        if message.len() > 200 {
            analytical += 0.2;
            formal += 0.1;
        } else if message.len() < 50 {
            casual += 0.2;
        }
        if message.contains('?') {
            expressive += 0.1;
            analytical += 0.1;
        }

        let scored = [
            ("formal", formal),
            ("casual", casual),
            ("analytical", analytical),
            ("expressive", expressive),
        ];
        let (style, score) = scored
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .copied()
            .unwrap_or(("adaptive", 0.0));

        if score > STYLE_THRESHOLD {
            style.to_string()
        } else {
            "adaptive".to_string()
        }
    }

    fn traits(message: &str, lowered: &str) -> Vec<String> {
        let mut traits: Vec<(f64, &str)> = Vec::new();
        for (name, patterns) in [
            ("curious", CURIOUS_PATTERNS),
            ("supportive", SUPPORTIVE_PATTERNS),
            ("creative", CREATIVE_PATTERNS),
            ("practical", PRACTICAL_PATTERNS),
        ] {
            let score = pattern_score(lowered, patterns);
            if score > TRAIT_THRESHOLD {
                traits.push((score, name));
            }
        }
        traits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut named: Vec<String> = traits.into_iter().map(|(_, name)| name.to_string()).collect();

        if message.split_whitespace().count() > 30 {
            named.push("thoughtful".to_string());
        }
        if ["help", "support", "understand"].iter().any(|w| lowered.contains(w)) {
            named.push("empathetic".to_string());
        }
        if ["idea", "think", "consider"].iter().any(|w| lowered.contains(w)) {
            named.push("reflective".to_string());
        }

        named.truncate(5);
        named
    }

    fn decision_style(lowered: &str) -> String {
        let mut deliberate = pattern_score(lowered, DELIBERATE_PATTERNS);
        let mut intuitive = pattern_score(lowered, INTUITIVE_PATTERNS);

        if ["analyze", "think", "consider", "weigh"].iter().any(|w| lowered.contains(w)) {
            deliberate += 0.3;
        }
        if ["feel", "sense", "intuition", "naturally"].iter().any(|w| lowered.contains(w)) {
            intuitive += 0.3;
        }

        if deliberate > intuitive && deliberate > TRAIT_THRESHOLD {
            "analytical".to_string()
        } else if intuitive > TRAIT_THRESHOLD {
            "intuitive".to_string()
        } else {
            "balanced".to_string()
        }
    }

    fn confidence_level(message: &str, lowered: &str) -> String {
        let mut high = pattern_score(lowered, HIGH_CONFIDENCE_PATTERNS);
        let mut tentative = pattern_score(lowered, TENTATIVE_PATTERNS);

        if message.contains('!') {
            high += 0.2;
        }
        if ["maybe", "perhaps", "might"].iter().any(|w| lowered.contains(w)) {
            tentative += 0.3;
        }

        if high > tentative && high > TRAIT_THRESHOLD {
            "confident".to_string()
        } else if tentative > TRAIT_THRESHOLD {
            "thoughtful".to_string()
        } else {
            "moderate".to_string()
        }
    }
}

/// Fraction of patterns present in the text, with a small per-hit boost,
/// capped at 1.0.
fn pattern_score(text: &str, patterns: &[&str]) -> f64 {
    if patterns.is_empty() {
        return 0.0;
    }
    let matches = patterns.iter().filter(|p| text.contains(*p)).count() as f64;
    (matches / patterns.len() as f64 + matches * 0.1).min(1.0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_casual_style() {
        let analysis =
            PersonalityAnalyzer::analyze_message("hey cool, sounds good", None);
        assert_eq!(analysis.communication_style, "casual");
    }

    #[test]
    fn test_adaptive_style_for_plain_text() {
        let analysis = PersonalityAnalyzer::analyze_message(
            "The report covers the second quarter results in detail for the finance team",
            None,
        );
        assert_eq!(analysis.communication_style, "adaptive");
    }

    #[test]
    fn test_analytical_long_message() {
        let message = "Because the first approach failed, we should therefore look at the \
                       data systematically. The analysis shows a clear pattern across all \
                       of the runs we have collected so far, and logically the next step \
                       follows from it.";
        let analysis = PersonalityAnalyzer::analyze_message(message, None);
        assert_eq!(analysis.communication_style, "analytical");
    }

    #[test]
    fn test_traits_detected_and_bounded() {
        let message = "I wonder why this works - I want to explore it, learn more, \
                       brainstorm something creative, maybe design a practical and \
                       efficient solution that would help people understand better";
        let analysis = PersonalityAnalyzer::analyze_message(message, None);
        assert!(!analysis.traits.is_empty());
        assert!(analysis.traits.len() <= 5);
        assert!(analysis.traits.iter().any(|t| t == "curious"));
    }

    #[test]
    fn test_decision_styles() {
        let deliberate = PersonalityAnalyzer::analyze_message(
            "Let me think about this and weigh pros and cons before we analyze carefully",
            None,
        );
        assert_eq!(deliberate.decision_style, "analytical");

        let intuitive = PersonalityAnalyzer::analyze_message(
            "This doesn't feel right, my gut instinct says no",
            None,
        );
        assert_eq!(intuitive.decision_style, "intuitive");

        let balanced = PersonalityAnalyzer::analyze_message("The sky is blue today", None);
        assert_eq!(balanced.decision_style, "balanced");
    }

    #[test]
    fn test_confidence_levels() {
        let confident = PersonalityAnalyzer::analyze_message(
            "I know this works, definitely, absolutely certain!",
            None,
        );
        assert_eq!(confident.confidence_level, "confident");

        let tentative =
            PersonalityAnalyzer::analyze_message("I think maybe this might be it, perhaps", None);
        assert_eq!(tentative.confidence_level, "thoughtful");
    }

    #[test]
    fn test_pattern_score_bounds() {
        assert_eq!(pattern_score("nothing here", FORMAL_PATTERNS), 0.0);
        let all = FORMAL_PATTERNS.join(" ");
        assert_eq!(pattern_score(&all, FORMAL_PATTERNS), 1.0);
    }

    #[test]
    fn test_empty_message() {
        let analysis = PersonalityAnalyzer::analyze_message("", None);
        // The short-message nudge alone stays under the style threshold
        assert_eq!(analysis.communication_style, "adaptive");
        assert!(analysis.traits.is_empty());
        assert_eq!(analysis.decision_style, "balanced");
        assert_eq!(analysis.confidence_level, "moderate");
    }
}
