//! Trajectory Analyzer
//!
//! Three operations chain into one public call:
//!
//! 1. `extract` - retrieve recent emotional states (smoothed intensities)
//!    for a user, ordered by time
//! 2. `compute` - quantify the arc: direction, magnitude, acceleration,
//!    variance, and a trend classification
//! 3. `summarize` - phrase the arc in natural language
//!
//! `retrieve_context` ties them together and never fails: extraction errors
//! degrade to an empty context.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::optimize::MemoryOptimizer;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Generic emotion-themed query used to pull emotional history
pub const TRAJECTORY_QUERY: &str = "emotion emotional feeling intensity";

/// Variance above this is classified as volatile
const VOLATILE_VARIANCE: f64 = 0.15;

/// Magnitude below this is classified as stable
const STABLE_MAGNITUDE: f64 = 0.1;

/// |direction| above this counts as a real trend
const TREND_DIRECTION: f64 = 0.2;

/// Magnitude or acceleration above these make a trend "sharp"
const SHARP_MAGNITUDE: f64 = 0.5;
const SHARP_ACCELERATION: f64 = 0.15;

// ============================================================================
// TYPES
// ============================================================================

/// Classification of emotional trajectory direction and magnitude
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryTrend {
    /// Consistent low emotion
    StableLow,
    /// Consistent neutral emotion
    StableNeutral,
    /// Consistent high emotion
    StableHigh,
    /// Gradual increase
    RisingSteady,
    /// Rapid increase
    RisingSharp,
    /// Gradual decrease
    FallingSteady,
    /// Rapid decrease
    FallingSharp,
    /// High variance, no clear trend
    Volatile,
    /// Insufficient data
    #[default]
    Unknown,
}

impl TrajectoryTrend {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TrajectoryTrend::StableLow => "stable_low",
            TrajectoryTrend::StableNeutral => "stable_neutral",
            TrajectoryTrend::StableHigh => "stable_high",
            TrajectoryTrend::RisingSteady => "rising_steady",
            TrajectoryTrend::RisingSharp => "rising_sharp",
            TrajectoryTrend::FallingSteady => "falling_steady",
            TrajectoryTrend::FallingSharp => "falling_sharp",
            TrajectoryTrend::Volatile => "volatile",
            TrajectoryTrend::Unknown => "unknown",
        }
    }

    /// Whether this is one of the sharp trends
    pub fn is_sharp(&self) -> bool {
        matches!(self, TrajectoryTrend::RisingSharp | TrajectoryTrend::FallingSharp)
    }
}

impl std::fmt::Display for TrajectoryTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Single emotional state in a trajectory
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionalPoint {
    /// When the state was observed
    pub timestamp: DateTime<Utc>,
    /// Smoothed intensity in `[0, 1]`
    pub ema_value: f64,
    /// Unsmoothed intensity, when recorded
    pub raw_value: Option<f64>,
    /// Short emotion tag ("joy", "frustration", ...)
    pub emotion_type: Option<String>,
}

/// Quantified emotional arc.
///
/// With fewer than two points the trend is `Unknown` and every numeric
/// field is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryVector {
    pub trend: TrajectoryTrend,
    /// Normalized slope, `-1.0` (falling) to `1.0` (rising)
    pub direction: f64,
    /// Total change, `0.0` (stable) to `1.0` (extreme)
    pub magnitude: f64,
    /// Mean absolute second difference of intensities
    pub acceleration: f64,
    /// Average intensity over the window
    pub mean_intensity: f64,
    /// Intensity variance (0 = steady)
    pub variance: f64,
    /// Number of data points used
    pub points_count: usize,
    /// Duration covered by the trajectory
    pub time_span: Duration,
}

impl TrajectoryVector {
    /// The empty trajectory: unknown trend, zero numerics
    pub fn unknown(points_count: usize) -> Self {
        Self {
            trend: TrajectoryTrend::Unknown,
            direction: 0.0,
            magnitude: 0.0,
            acceleration: 0.0,
            mean_intensity: 0.0,
            variance: 0.0,
            points_count,
            time_span: Duration::zero(),
        }
    }
}

/// Flattened result of a full trajectory analysis
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrajectoryContext {
    pub has_trajectory: bool,
    pub vector: Option<TrajectoryVector>,
    pub summary: String,
    pub points_count: usize,
    pub trend: TrajectoryTrend,
    pub direction: f64,
    pub magnitude: f64,
    pub variance: f64,
}

// ============================================================================
// TRAJECTORY ANALYZER
// ============================================================================

/// Analyzes emotional trajectories from stored memory payloads.
pub struct TrajectoryAnalyzer {
    optimizer: Arc<MemoryOptimizer>,
}

impl TrajectoryAnalyzer {
    /// Create an analyzer over the shared memory optimizer
    pub fn new(optimizer: Arc<MemoryOptimizer>) -> Self {
        Self { optimizer }
    }

    /// Extract ordered emotional points from a user's recent memories.
    ///
    /// Prefers the smoothed intensity, falls back to the raw one; points
    /// without a timestamp or intensity are dropped. Points are returned
    /// even when the span is shorter than `min_span` - span decisions
    /// belong to the caller. Extraction errors degrade to an empty list.
    pub async fn extract(
        &self,
        user_id: &str,
        lookback: usize,
        min_span: Duration,
    ) -> Vec<EmotionalPoint> {
        let hits = match self
            .optimizer
            .search(TRAJECTORY_QUERY, Some(user_id), lookback, None)
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                warn!(user_id, error = %err, "trajectory extraction failed");
                return Vec::new();
            }
        };

        let mut points: Vec<EmotionalPoint> = hits
            .iter()
            .filter_map(|hit| {
                let timestamp = hit.payload.timestamp?;
                let ema = hit
                    .payload
                    .emotional_intensity_ema
                    .or(hit.payload.emotional_intensity)?;
                Some(EmotionalPoint {
                    timestamp,
                    ema_value: ema.clamp(0.0, 1.0),
                    raw_value: hit.payload.emotional_intensity,
                    emotion_type: hit.payload.emotion_type.clone(),
                })
            })
            .collect();

        points.sort_by_key(|p| p.timestamp);

        if points.len() >= 2 {
            let span = points[points.len() - 1].timestamp - points[0].timestamp;
            if span < min_span {
                debug!(user_id, span_seconds = span.num_seconds(), "trajectory span below minimum");
            }
        }

        debug!(user_id, count = points.len(), "trajectory points extracted");
        points
    }

    /// Quantify an ordered point series into a [`TrajectoryVector`].
    pub fn compute(&self, points: &[EmotionalPoint]) -> TrajectoryVector {
        Self::compute_vector(points)
    }

    /// Static form of [`Self::compute`], usable without an analyzer.
    pub fn compute_vector(points: &[EmotionalPoint]) -> TrajectoryVector {
        let n = points.len();
        if n < 2 {
            return TrajectoryVector::unknown(n);
        }

        let values: Vec<f64> = points.iter().map(|p| p.ema_value).collect();
        let count = n as f64;

        let mean_intensity = values.iter().sum::<f64>() / count;
        let variance = values
            .iter()
            .map(|v| (v - mean_intensity).powi(2))
            .sum::<f64>()
            / count;

        // Least-squares slope against the integer index, normalized so that
        // a full-scale sweep over the window maps to +/-1.
        let x_mean = (count - 1.0) / 2.0;
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (i, v) in values.iter().enumerate() {
            let dx = i as f64 - x_mean;
            numerator += dx * (v - mean_intensity);
            denominator += dx * dx;
        }
        let slope = if denominator > 0.0 { numerator / denominator } else { 0.0 };
        let max_slope = 1.0 / (count - 1.0).max(1.0);
        let direction = (slope / max_slope).clamp(-1.0, 1.0);

        let magnitude = (values[n - 1] - values[0]).abs().min(1.0);

        let acceleration = if n >= 3 {
            let first_diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
            let second_diffs: Vec<f64> =
                first_diffs.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
            second_diffs.iter().sum::<f64>() / second_diffs.len() as f64
        } else {
            0.0
        };

        let trend = Self::classify(direction, magnitude, variance, acceleration);
        let time_span = points[n - 1].timestamp - points[0].timestamp;

        TrajectoryVector {
            trend,
            direction,
            magnitude,
            acceleration,
            mean_intensity,
            variance,
            points_count: n,
            time_span,
        }
    }

    fn classify(
        direction: f64,
        magnitude: f64,
        variance: f64,
        acceleration: f64,
    ) -> TrajectoryTrend {
        if variance > VOLATILE_VARIANCE {
            return TrajectoryTrend::Volatile;
        }
        if magnitude < STABLE_MAGNITUDE {
            // A refinement could split stable_low/stable_high off
            // mean_intensity; the observable behavior stays neutral.
            return TrajectoryTrend::StableNeutral;
        }

        let sharp = magnitude > SHARP_MAGNITUDE || acceleration > SHARP_ACCELERATION;
        if direction > TREND_DIRECTION {
            return if sharp {
                TrajectoryTrend::RisingSharp
            } else {
                TrajectoryTrend::RisingSteady
            };
        }
        if direction < -TREND_DIRECTION {
            return if sharp {
                TrajectoryTrend::FallingSharp
            } else {
                TrajectoryTrend::FallingSteady
            };
        }
        TrajectoryTrend::StableNeutral
    }

    /// Phrase a trajectory in natural language.
    ///
    /// Empty for trajectories without a describable trend (unknown,
    /// stable-neutral) or with fewer than two points.
    pub fn summarize(&self, vector: &TrajectoryVector) -> String {
        Self::summarize_vector(vector)
    }

    /// Static form of [`Self::summarize`].
    pub fn summarize_vector(vector: &TrajectoryVector) -> String {
        if vector.points_count < 2 {
            return String::new();
        }

        let trend_phrase = match vector.trend {
            TrajectoryTrend::RisingSharp => "rapidly escalating",
            TrajectoryTrend::RisingSteady => "gradually increasing",
            TrajectoryTrend::FallingSharp => "rapidly de-escalating",
            TrajectoryTrend::FallingSteady => "gradually decreasing",
            TrajectoryTrend::StableHigh => "consistently high",
            TrajectoryTrend::StableLow => "consistently low",
            TrajectoryTrend::Volatile => "fluctuating unpredictably",
            TrajectoryTrend::StableNeutral | TrajectoryTrend::Unknown => return String::new(),
        };

        let intensity_noun = if vector.mean_intensity > 0.7 {
            "emotional state"
        } else if vector.mean_intensity > 0.4 {
            "mood"
        } else {
            "disposition"
        };

        let minutes = vector.time_span.num_seconds() as f64 / 60.0;
        let time_phrase = if minutes < 10.0 {
            "over the last few minutes".to_string()
        } else if minutes < 60.0 {
            format!("over the last {} minutes", minutes as i64)
        } else if minutes < 1440.0 {
            let hours = (minutes / 60.0) as i64;
            format!("over the last {} hour{}", hours, if hours > 1 { "s" } else { "" })
        } else {
            let days = (minutes / 1440.0) as i64;
            format!("over the last {} day{}", days, if days > 1 { "s" } else { "" })
        };

        let qualifier = if vector.points_count < 3 {
            " (based on limited data)"
        } else {
            ""
        };

        format!("{trend_phrase} {intensity_noun} {time_phrase}{qualifier}")
    }

    /// Full analysis in one call: extract, compute, summarize.
    ///
    /// Never fails; missing or broken data yields an empty context.
    pub async fn retrieve_context(
        &self,
        user_id: &str,
        lookback: usize,
        min_span: Duration,
        include_summary: bool,
    ) -> TrajectoryContext {
        let points = self.extract(user_id, lookback, min_span).await;
        if points.is_empty() {
            return TrajectoryContext::default();
        }

        let vector = Self::compute_vector(&points);
        let summary = if include_summary {
            Self::summarize_vector(&vector)
        } else {
            String::new()
        };

        TrajectoryContext {
            has_trajectory: vector.points_count >= 2,
            points_count: vector.points_count,
            trend: vector.trend,
            direction: vector.direction,
            magnitude: vector.magnitude,
            variance: vector.variance,
            summary,
            vector: Some(vector),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn points_at_5min_intervals(values: &[f64]) -> Vec<EmotionalPoint> {
        let start = Utc::now() - Duration::minutes(5 * values.len() as i64);
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EmotionalPoint {
                timestamp: start + Duration::minutes(5 * i as i64),
                ema_value: v,
                raw_value: None,
                emotion_type: None,
            })
            .collect()
    }

    #[test]
    fn test_empty_points_yield_unknown() {
        let vector = TrajectoryAnalyzer::compute_vector(&[]);
        assert_eq!(vector.trend, TrajectoryTrend::Unknown);
        assert_eq!(vector.direction, 0.0);
        assert_eq!(vector.magnitude, 0.0);
        assert_eq!(vector.points_count, 0);
    }

    #[test]
    fn test_single_point_yields_unknown_and_empty_summary() {
        let points = points_at_5min_intervals(&[0.5]);
        let vector = TrajectoryAnalyzer::compute_vector(&points);
        assert_eq!(vector.trend, TrajectoryTrend::Unknown);
        assert_eq!(vector.mean_intensity, 0.0);
        assert_eq!(TrajectoryAnalyzer::summarize_vector(&vector), "");
    }

    #[test]
    fn test_escalating_series_is_rising_sharp() {
        let points = points_at_5min_intervals(&[0.2, 0.4, 0.6, 0.8, 0.9]);
        let vector = TrajectoryAnalyzer::compute_vector(&points);

        assert!(vector.direction > 0.2, "direction {}", vector.direction);
        assert!(vector.magnitude >= 0.6, "magnitude {}", vector.magnitude);
        assert_eq!(vector.trend, TrajectoryTrend::RisingSharp);
        assert!((vector.magnitude - 0.7).abs() < 1e-9);

        let summary = TrajectoryAnalyzer::summarize_vector(&vector);
        assert!(summary.contains("escalat"), "summary: {summary}");
        assert!(summary.contains("minutes"), "summary: {summary}");
    }

    #[test]
    fn test_flat_series_is_stable_neutral() {
        let points = points_at_5min_intervals(&[0.5, 0.5, 0.5]);
        let vector = TrajectoryAnalyzer::compute_vector(&points);
        assert_eq!(vector.trend, TrajectoryTrend::StableNeutral);
        assert!(vector.magnitude < 0.01);
        assert_eq!(vector.direction, 0.0);
        // No describable trend: summary stays empty
        assert_eq!(TrajectoryAnalyzer::summarize_vector(&vector), "");
    }

    #[test]
    fn test_falling_series() {
        let points = points_at_5min_intervals(&[0.8, 0.7, 0.6, 0.5]);
        let vector = TrajectoryAnalyzer::compute_vector(&points);
        assert_eq!(vector.trend, TrajectoryTrend::FallingSteady);
        assert!(vector.direction < -0.2);

        let summary = TrajectoryAnalyzer::summarize_vector(&vector);
        assert!(summary.contains("gradually decreasing"), "summary: {summary}");
    }

    #[test]
    fn test_volatile_series() {
        let points = points_at_5min_intervals(&[0.1, 0.9, 0.1, 0.9, 0.1]);
        let vector = TrajectoryAnalyzer::compute_vector(&points);
        assert!(vector.variance > 0.15);
        assert_eq!(vector.trend, TrajectoryTrend::Volatile);

        let summary = TrajectoryAnalyzer::summarize_vector(&vector);
        assert!(summary.contains("fluctuating"), "summary: {summary}");
    }

    #[test]
    fn test_direction_and_magnitude_bounds() {
        for values in [
            &[0.0, 1.0][..],
            &[1.0, 0.0][..],
            &[0.0, 0.5, 1.0][..],
            &[0.9, 0.1, 0.9][..],
            &[0.3, 0.3, 0.3, 0.3][..],
        ] {
            let points = points_at_5min_intervals(values);
            let vector = TrajectoryAnalyzer::compute_vector(&points);
            assert!((-1.0..=1.0).contains(&vector.direction), "direction out of range");
            assert!((0.0..=1.0).contains(&vector.magnitude), "magnitude out of range");
            assert!(vector.acceleration >= 0.0);
        }
    }

    #[test]
    fn test_two_points_flagged_as_limited_data() {
        let points = points_at_5min_intervals(&[0.2, 0.8]);
        let vector = TrajectoryAnalyzer::compute_vector(&points);
        let summary = TrajectoryAnalyzer::summarize_vector(&vector);
        assert!(summary.ends_with("(based on limited data)"), "summary: {summary}");
    }

    #[test]
    fn test_time_phrases() {
        let mut points = points_at_5min_intervals(&[0.2, 0.9]);
        // Stretch the span to two hours
        points[1].timestamp = points[0].timestamp + Duration::hours(2);
        let vector = TrajectoryAnalyzer::compute_vector(&points);
        let summary = TrajectoryAnalyzer::summarize_vector(&vector);
        assert!(summary.contains("over the last 2 hours"), "summary: {summary}");

        points[1].timestamp = points[0].timestamp + Duration::days(3);
        let vector = TrajectoryAnalyzer::compute_vector(&points);
        let summary = TrajectoryAnalyzer::summarize_vector(&vector);
        assert!(summary.contains("over the last 3 days"), "summary: {summary}");
    }

    #[test]
    fn test_acceleration_needs_three_points() {
        let points = points_at_5min_intervals(&[0.1, 0.9]);
        let vector = TrajectoryAnalyzer::compute_vector(&points);
        assert_eq!(vector.acceleration, 0.0);

        let points = points_at_5min_intervals(&[0.1, 0.2, 0.8]);
        let vector = TrajectoryAnalyzer::compute_vector(&points);
        assert!(vector.acceleration > 0.0);
    }
}
