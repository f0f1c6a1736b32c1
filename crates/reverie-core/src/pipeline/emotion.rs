//! Emotion Analysis
//!
//! The pipeline treats emotion analysis as a black-box collaborator behind
//! [`EmotionAnalyzer`]; deployments plug in whatever engine they run.
//!
//! [`LexicalEmotionAnalyzer`] is the built-in implementation: a
//! valence/arousal word lexicon with a negation window and urgency markers,
//! classified on the valence-arousal circumplex. Cheap, deterministic, and
//! good enough to keep the pipeline honest without an external service.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::pipeline::AnalysisError;

// ============================================================================
// CONTRACT
// ============================================================================

/// Result of analyzing one message's emotional content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionAssessment {
    /// Dominant emotion tag ("joy", "frustration", ...)
    pub primary_emotion: String,
    /// Confidence in the classification, `[0, 1]`
    pub confidence: f64,
    /// Emotional intensity, `[0, 1]`
    pub intensity: f64,
    /// Whether the user likely needs emotional support
    pub support_needed: bool,
    /// Response-guidance phrases for the downstream prompt
    pub recommendations: Vec<String>,
}

/// Black-box emotion analysis collaborator
#[async_trait]
pub trait EmotionAnalyzer: Send + Sync {
    /// Analyze one user message
    async fn analyze(&self, user_id: &str, message: &str)
        -> Result<EmotionAssessment, AnalysisError>;
}

// ============================================================================
// LEXICAL IMPLEMENTATION
// ============================================================================

/// Word -> (valence, arousal). Valence in `[-1, 1]`, arousal in `[0, 1]`.
static LEXICON: LazyLock<HashMap<&'static str, (f64, f64)>> = LazyLock::new(|| {
    let mut lex = HashMap::new();

    // Positive / low arousal
    for (word, v, a) in [
        ("good", 0.6, 0.3),
        ("nice", 0.5, 0.2),
        ("fine", 0.3, 0.1),
        ("calm", 0.4, 0.1),
        ("okay", 0.2, 0.1),
        ("relaxed", 0.5, 0.1),
        ("content", 0.5, 0.2),
        ("peaceful", 0.6, 0.1),
    ] {
        lex.insert(word, (v, a));
    }

    // Positive / high arousal
    for (word, v, a) in [
        ("amazing", 0.9, 0.8),
        ("excellent", 0.8, 0.6),
        ("perfect", 0.9, 0.7),
        ("awesome", 0.8, 0.7),
        ("great", 0.7, 0.5),
        ("fantastic", 0.9, 0.8),
        ("love", 0.8, 0.7),
        ("excited", 0.7, 0.8),
        ("thrilled", 0.8, 0.8),
        ("happy", 0.7, 0.5),
        ("wonderful", 0.8, 0.6),
        ("delighted", 0.8, 0.7),
        ("glad", 0.6, 0.4),
    ] {
        lex.insert(word, (v, a));
    }

    // Gratitude
    for (word, v, a) in [
        ("thanks", 0.6, 0.4),
        ("thank", 0.6, 0.4),
        ("grateful", 0.7, 0.4),
        ("appreciate", 0.6, 0.4),
    ] {
        lex.insert(word, (v, a));
    }

    // Negative / low arousal
    for (word, v, a) in [
        ("sad", -0.6, 0.3),
        ("tired", -0.3, 0.2),
        ("lonely", -0.6, 0.3),
        ("bored", -0.3, 0.1),
        ("down", -0.4, 0.2),
        ("disappointed", -0.5, 0.3),
        ("unhappy", -0.6, 0.3),
        ("miserable", -0.7, 0.4),
        ("confused", -0.3, 0.3),
        ("unsure", -0.2, 0.2),
    ] {
        lex.insert(word, (v, a));
    }

    // Negative / high arousal
    for (word, v, a) in [
        ("angry", -0.7, 0.8),
        ("furious", -0.9, 0.9),
        ("frustrated", -0.6, 0.7),
        ("frustrating", -0.6, 0.7),
        ("annoyed", -0.5, 0.6),
        ("mad", -0.7, 0.7),
        ("hate", -0.8, 0.8),
        ("terrible", -0.7, 0.6),
        ("awful", -0.7, 0.6),
        ("horrible", -0.8, 0.7),
        ("upset", -0.6, 0.6),
        ("stressed", -0.6, 0.7),
        ("anxious", -0.5, 0.7),
        ("worried", -0.5, 0.6),
        ("scared", -0.6, 0.7),
        ("afraid", -0.6, 0.7),
        ("panicking", -0.8, 0.9),
        ("overwhelmed", -0.6, 0.7),
        ("desperate", -0.7, 0.8),
    ] {
        lex.insert(word, (v, a));
    }

    // Curiosity and surprise
    for (word, v, a) in [
        ("curious", 0.3, 0.5),
        ("interesting", 0.4, 0.6),
        ("wonder", 0.3, 0.5),
        ("surprised", 0.1, 0.7),
        ("unexpected", 0.0, 0.7),
        ("strange", -0.1, 0.6),
        ("weird", -0.2, 0.5),
    ] {
        lex.insert(word, (v, a));
    }

    lex
});

/// Phrases that spike arousal regardless of lexicon coverage
const URGENCY_MARKERS: &[&str] = &[
    "can't take it",
    "can't handle",
    "right now",
    "emergency",
    "need help",
    "please help",
    "losing it",
    "breaking down",
    "fed up",
];

/// Words that flip the valence of what follows
const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "won't", "can't", "couldn't",
    "shouldn't", "without", "hardly",
];

/// Window (in words) a negation reaches forward
const NEGATION_WINDOW: usize = 3;

/// Response guidance per primary emotion, lifted into the prompt when the
/// slot survives.
fn guidance_for(emotion: &str) -> Option<&'static str> {
    match emotion {
        "excitement" => Some("Match their enthusiasm and encourage their excitement"),
        "joy" => Some("Keep the positive energy going and celebrate with them"),
        "gratitude" => Some("Warmly acknowledge their appreciation"),
        "frustration" => Some("Acknowledge their frustration and offer patient understanding"),
        "sadness" => Some("Show empathetic care and emotional support"),
        "anxiety" => Some("Provide supportive understanding and gentle reassurance"),
        "curiosity" => Some("Engage their curiosity with thoughtful exploration"),
        _ => None,
    }
}

/// Lexicon-based emotion analyzer
#[derive(Debug, Default)]
pub struct LexicalEmotionAnalyzer;

impl LexicalEmotionAnalyzer {
    /// Create the analyzer; the lexicon is shared and lazily built
    pub fn new() -> Self {
        Self
    }

    /// Synchronous core, exposed for direct use and tests.
    pub fn assess(&self, message: &str) -> EmotionAssessment {
        let words: Vec<String> = message
            .to_lowercase()
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                    .to_string()
            })
            .filter(|w| !w.is_empty())
            .collect();

        let mut total_valence = 0.0;
        let mut total_arousal = 0.0;
        let mut hits = 0usize;
        let mut gratitude_hit = false;
        let mut curiosity_hit = false;

        for (i, word) in words.iter().enumerate() {
            let Some(&(valence, arousal)) = LEXICON.get(word.as_str()) else {
                continue;
            };
            let negated = (i.saturating_sub(NEGATION_WINDOW)..i)
                .any(|j| NEGATION_WORDS.contains(&words[j].as_str()));
            total_valence += if negated { -valence * 0.7 } else { valence };
            total_arousal += arousal;
            hits += 1;

            if matches!(word.as_str(), "thanks" | "thank" | "grateful" | "appreciate") {
                gratitude_hit = true;
            }
            if matches!(word.as_str(), "curious" | "interesting" | "wonder") {
                curiosity_hit = true;
            }
        }

        let message_lower = message.to_lowercase();
        let urgency: f64 = URGENCY_MARKERS
            .iter()
            .filter(|marker| message_lower.contains(*marker))
            .count() as f64
            * 0.3;

        let (valence, arousal) = if hits > 0 {
            (
                (total_valence / hits as f64).clamp(-1.0, 1.0),
                (total_arousal / hits as f64 + urgency).clamp(0.0, 1.0),
            )
        } else {
            (0.0, urgency.clamp(0.0, 1.0))
        };

        let primary_emotion =
            Self::classify(valence, arousal, gratitude_hit, curiosity_hit, &message_lower);

        // Confidence tracks lexicon coverage, bumped by urgency cues and
        // repeated signals
        let confidence = if words.is_empty() {
            0.0
        } else {
            ((hits as f64 / words.len() as f64).min(1.0) * 0.5
                + if urgency > 0.0 { 0.3 } else { 0.0 }
                + if hits > 3 { 0.2 } else { 0.0 })
            .clamp(0.0, 1.0)
        };

        let support_needed = (valence < -0.3 && arousal > 0.5) || urgency >= 0.6;

        let mut recommendations = Vec::new();
        if let Some(guidance) = guidance_for(&primary_emotion) {
            recommendations.push(guidance.to_string());
        }
        if support_needed {
            recommendations.push("Prioritize emotional support over problem-solving".to_string());
        }

        EmotionAssessment {
            primary_emotion,
            confidence,
            intensity: arousal,
            support_needed,
            recommendations,
        }
    }

    /// Russell-style circumplex classification with cue overrides
    fn classify(
        valence: f64,
        arousal: f64,
        gratitude: bool,
        curiosity: bool,
        message_lower: &str,
    ) -> String {
        if gratitude && valence > 0.0 {
            return "gratitude".to_string();
        }
        if valence > 0.3 && arousal > 0.6 {
            return "excitement".to_string();
        }
        if valence > 0.3 {
            return "joy".to_string();
        }
        if valence < -0.3 && arousal > 0.5 {
            return "frustration".to_string();
        }
        if valence < -0.3 && arousal > 0.4 {
            return "anxiety".to_string();
        }
        if valence < -0.2 {
            return "sadness".to_string();
        }
        if curiosity || (message_lower.contains('?') && arousal > 0.3) {
            return "curiosity".to_string();
        }
        "neutral".to_string()
    }
}

#[async_trait]
impl EmotionAnalyzer for LexicalEmotionAnalyzer {
    async fn analyze(
        &self,
        _user_id: &str,
        message: &str,
    ) -> Result<EmotionAssessment, AnalysisError> {
        Ok(self.assess(message))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_message() {
        let analyzer = LexicalEmotionAnalyzer::new();
        let result = analyzer.assess("The meeting is at three on Tuesday");
        assert_eq!(result.primary_emotion, "neutral");
        assert!(!result.support_needed);
    }

    #[test]
    fn test_frustrated_message() {
        let analyzer = LexicalEmotionAnalyzer::new();
        let result = analyzer.assess("I'm so frustrated and angry, this is terrible");
        assert_eq!(result.primary_emotion, "frustration");
        assert!(result.intensity > 0.5, "intensity {}", result.intensity);
        assert!(result.support_needed);
        assert!(!result.recommendations.is_empty());
    }

    #[test]
    fn test_excited_message() {
        let analyzer = LexicalEmotionAnalyzer::new();
        let result = analyzer.assess("This is amazing, I'm so excited and thrilled!");
        assert_eq!(result.primary_emotion, "excitement");
        assert!(!result.support_needed);
    }

    #[test]
    fn test_gratitude_wins_over_generic_positive() {
        let analyzer = LexicalEmotionAnalyzer::new();
        let result = analyzer.assess("Thanks so much, I really appreciate the help");
        assert_eq!(result.primary_emotion, "gratitude");
    }

    #[test]
    fn test_sad_message() {
        let analyzer = LexicalEmotionAnalyzer::new();
        let result = analyzer.assess("I've been feeling pretty sad and lonely lately");
        assert_eq!(result.primary_emotion, "sadness");
    }

    #[test]
    fn test_negation_dampens_valence() {
        let analyzer = LexicalEmotionAnalyzer::new();
        let positive = analyzer.assess("this is amazing");
        let negated = analyzer.assess("this is not amazing");
        // A negated positive reads as mildly negative, never as joy
        assert_ne!(negated.primary_emotion, positive.primary_emotion);
    }

    #[test]
    fn test_urgency_markers_force_support() {
        let analyzer = LexicalEmotionAnalyzer::new();
        let result = analyzer.assess("please help, I need help and I'm losing it");
        assert!(result.support_needed);
        assert!(result.intensity > 0.5);
    }

    #[test]
    fn test_empty_message() {
        let analyzer = LexicalEmotionAnalyzer::new();
        let result = analyzer.assess("");
        assert_eq!(result.primary_emotion, "neutral");
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.intensity, 0.0);
    }

    #[tokio::test]
    async fn test_trait_impl_never_fails() {
        let analyzer = LexicalEmotionAnalyzer::new();
        let result = analyzer.analyze("u1", "hello there").await;
        assert!(result.is_ok());
    }
}
