//! Trajectory / Character Bridge
//!
//! Converts a quantified trajectory into a prompt-injection block tailored
//! to the character archetype, and decides whether the block earns its
//! place in the prompt at all.
//!
//! Two derived scores gate injection:
//! - **confidence**: how much the data can be trusted (volume, stability,
//!   non-extreme magnitude)
//! - **injection priority**: how much the arc matters right now (magnitude,
//!   sharpness), scaled by confidence
//!
//! Injection is additive and gated, never required: a low-priority arc
//! simply stays out of the prompt.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::trajectory::analyzer::{TrajectoryAnalyzer, TrajectoryContext, TrajectoryTrend};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Minimum priority and confidence for injection
const MIN_INJECTION_PRIORITY: f64 = 0.4;
const MIN_INJECTION_CONFIDENCE: f64 = 0.5;

/// Prompts past this word count only admit high-priority trajectories
const CROWDED_PROMPT_WORDS: usize = 2800;
const CROWDED_PROMPT_PRIORITY: f64 = 0.7;

// ============================================================================
// TYPES
// ============================================================================

/// Character archetype tag from the character-definition layer.
///
/// Only the tag matters here; it selects the wrapper phrasing for the
/// trajectory block.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CharacterArchetype {
    /// Grounded, everyday persona; references feelings naturally
    #[default]
    #[serde(rename = "real-world")]
    RealWorld,
    /// May reference the emotional arc more mystically
    #[serde(rename = "fantasy")]
    Fantasy,
    /// Can be openly meta about emotional tracking
    #[serde(rename = "narrative_ai")]
    NarrativeAi,
}

impl CharacterArchetype {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CharacterArchetype::RealWorld => "real-world",
            CharacterArchetype::Fantasy => "fantasy",
            CharacterArchetype::NarrativeAi => "narrative_ai",
        }
    }
}

impl std::fmt::Display for CharacterArchetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trajectory context shaped for prompt injection.
///
/// Knows how to render itself per archetype and whether it should appear
/// in a prompt at all.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrajectoryPromptContext {
    pub has_trajectory: bool,
    /// Natural-language summary from the analyzer
    pub summary: String,
    pub trend: TrajectoryTrend,
    /// Character-aware awareness phrase
    pub awareness: String,
    /// Reliability of the analysis, `[0, 1]`
    pub confidence: f64,
    /// "over the last 15 minutes" and friends
    pub time_context: String,
    /// Injection weight, `[0, 1]`
    pub injection_priority: f64,
    pub direction: f64,
    pub magnitude: f64,
    pub variance: f64,
    pub points_count: usize,
    /// Inverse of variance
    pub stability: f64,
}

impl TrajectoryPromptContext {
    /// Shape an analyzer result into the prompt-facing form, deriving the
    /// awareness phrase, confidence, priority, and time phrasing.
    pub fn from_analysis(ctx: &TrajectoryContext) -> Self {
        if !ctx.has_trajectory {
            return Self::default();
        }

        let confidence = confidence(ctx.points_count, ctx.variance, ctx.magnitude);
        let priority = injection_priority(ctx.magnitude, ctx.trend, confidence);
        let time_context = ctx
            .vector
            .as_ref()
            .map(|v| format_time_context(v.time_span))
            .unwrap_or_default();

        let shaped = Self {
            has_trajectory: true,
            summary: ctx.summary.clone(),
            trend: ctx.trend,
            awareness: emotional_awareness(ctx.trend, ctx.magnitude, ctx.variance),
            confidence,
            time_context,
            injection_priority: priority,
            direction: ctx.direction,
            magnitude: ctx.magnitude,
            variance: ctx.variance,
            points_count: ctx.points_count,
            stability: 1.0 - ctx.variance,
        };
        debug!(
            trend = %shaped.trend,
            priority = shaped.injection_priority,
            confidence = shaped.confidence,
            "trajectory context shaped for prompt"
        );
        shaped
    }

    /// Render the trajectory block for a character archetype.
    ///
    /// Empty when there is no trajectory or no summary to phrase.
    pub fn format_for(&self, archetype: CharacterArchetype, include_time: bool) -> String {
        if !self.has_trajectory || self.summary.is_empty() {
            return String::new();
        }

        let time = if include_time && !self.time_context.is_empty() {
            format!(" {}", self.time_context)
        } else {
            String::new()
        };

        match archetype {
            CharacterArchetype::Fantasy => {
                format!("[Emotional Context: {}{}]", self.summary, time)
            }
            CharacterArchetype::NarrativeAi => {
                format!(
                    "[Character Context: The user's emotional state {}{}]",
                    self.summary, time
                )
            }
            CharacterArchetype::RealWorld => {
                format!("[Context Note: {}{}]", self.awareness, time)
            }
        }
    }

    /// Decide whether this block belongs in the final prompt.
    pub fn should_inject(&self, prompt_word_count: usize) -> bool {
        if !self.has_trajectory {
            return false;
        }
        if self.injection_priority < MIN_INJECTION_PRIORITY
            || self.confidence < MIN_INJECTION_CONFIDENCE
            || self.points_count < 2
        {
            debug!(
                priority = self.injection_priority,
                confidence = self.confidence,
                points = self.points_count,
                "trajectory filtered below thresholds"
            );
            return false;
        }
        if prompt_word_count > CROWDED_PROMPT_WORDS
            && self.injection_priority < CROWDED_PROMPT_PRIORITY
        {
            debug!("trajectory filtered: prompt crowded and priority moderate");
            return false;
        }
        true
    }
}

// ============================================================================
// DERIVED SCORES
// ============================================================================

/// Reliability score from data volume minus instability penalties.
pub fn confidence(points_count: usize, variance: f64, magnitude: f64) -> f64 {
    let base: f64 = match points_count {
        0..2 => 0.1,
        2 => 0.4,
        3..5 => 0.6,
        5..8 => 0.75,
        _ => 0.9,
    };

    let variance_penalty = if variance > 0.2 {
        0.1
    } else if variance > 0.15 {
        0.05
    } else {
        0.0
    };

    // Extreme magnitudes (floor or ceiling) read less reliably than
    // moderate change
    let magnitude_penalty = if magnitude > 0.9 || magnitude < 0.05 {
        0.05
    } else {
        0.0
    };

    (base - variance_penalty - magnitude_penalty).clamp(0.0, 1.0)
}

/// Injection weight: magnitude base plus sharpness bonus, scaled by
/// confidence.
pub fn injection_priority(magnitude: f64, trend: TrajectoryTrend, confidence: f64) -> f64 {
    let base = if magnitude < 0.1 {
        0.2
    } else if magnitude < 0.3 {
        0.4
    } else if magnitude < 0.6 {
        0.6
    } else {
        0.8
    };

    let trend_bonus = if trend.is_sharp() {
        0.15
    } else if trend == TrajectoryTrend::Volatile {
        0.1
    } else {
        0.0
    };

    ((base + trend_bonus) * confidence).clamp(0.0, 1.0)
}

/// Character-aware phrase describing the user's arc.
pub fn emotional_awareness(trend: TrajectoryTrend, magnitude: f64, variance: f64) -> String {
    let base_phrase = match trend {
        TrajectoryTrend::RisingSharp => "getting increasingly intense about things",
        TrajectoryTrend::RisingSteady => "gradually becoming more engaged",
        TrajectoryTrend::FallingSharp => "rapidly mellowing out",
        TrajectoryTrend::FallingSteady => "slowly becoming more calm",
        TrajectoryTrend::StableLow => "in a consistently subdued emotional state",
        TrajectoryTrend::StableNeutral => "maintaining a balanced emotional state",
        TrajectoryTrend::StableHigh => "staying in an elevated emotional place",
        TrajectoryTrend::Volatile => "experiencing significant emotional fluctuations",
        TrajectoryTrend::Unknown => "on an unclear emotional trajectory",
    };

    let intensity = if magnitude > 0.7 {
        "quite dramatically "
    } else if magnitude > 0.4 {
        "noticeably "
    } else {
        "somewhat "
    };

    let stability = if variance > 0.15 {
        " - your emotional baseline seems pretty unpredictable"
    } else if variance > 0.08 {
        " - with some fluctuation"
    } else {
        ""
    };

    format!("{intensity}{base_phrase}{stability}")
}

/// Natural-language span phrasing
pub fn format_time_context(time_span: Duration) -> String {
    let minutes = time_span.num_seconds() as f64 / 60.0;
    let hours = minutes / 60.0;
    let days = hours / 24.0;

    if minutes < 10.0 {
        "over the last few minutes".to_string()
    } else if minutes < 60.0 {
        format!("over the last {} minutes", minutes as i64)
    } else if hours < 1.5 {
        "over the past hour".to_string()
    } else if hours < 24.0 {
        let count = hours as i64;
        format!("over the last {} hour{}", count, if count != 1 { "s" } else { "" })
    } else if days < 2.0 {
        "over the last day".to_string()
    } else {
        format!("over the last {} days", days as i64)
    }
}

// ============================================================================
// BRIDGE
// ============================================================================

/// Bridge between the trajectory analyzer and character prompt assembly.
pub struct TrajectoryCdlBridge {
    analyzer: TrajectoryAnalyzer,
    lookback: usize,
    min_span: Duration,
}

impl TrajectoryCdlBridge {
    /// Create a bridge with the configured lookback window
    pub fn new(analyzer: TrajectoryAnalyzer, lookback: usize, min_span: Duration) -> Self {
        Self {
            analyzer,
            lookback,
            min_span,
        }
    }

    /// Run the full analysis and shape it for prompt injection.
    ///
    /// Never fails: any breakdown yields the empty context, which
    /// [`TrajectoryPromptContext::should_inject`] rejects.
    pub async fn trajectory_context(&self, user_id: &str) -> TrajectoryPromptContext {
        let ctx = self
            .analyzer
            .retrieve_context(user_id, self.lookback, self.min_span, true)
            .await;
        TrajectoryPromptContext::from_analysis(&ctx)
    }

    /// Render the trajectory block for a character archetype.
    pub fn format_for_cdl(
        &self,
        ctx: &TrajectoryPromptContext,
        archetype: CharacterArchetype,
        include_time: bool,
    ) -> String {
        ctx.format_for(archetype, include_time)
    }

    /// Decide whether the trajectory block belongs in the final prompt.
    pub fn should_inject(&self, ctx: &TrajectoryPromptContext, prompt_word_count: usize) -> bool {
        ctx.should_inject(prompt_word_count)
    }
}

// ============================================================================
// TESTS
// ============================================================================
