//! Core Configuration
//!
//! One flat config struct for the whole core, deserialized from whatever
//! the host application uses for config files and validated once at
//! construction. Invalid configuration fails fast; nothing else in the
//! core re-checks these values.

use serde::{Deserialize, Serialize};

use crate::optimize::OptimizationLevel;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Rejected configuration; raised at construction only
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A value is outside its allowed range
    #[error("invalid config value for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        reason: String,
    },
}

// ============================================================================
// CONFIG
// ============================================================================

/// Tuning knobs for the memory and intelligence core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Behavior tier for query rewriting, coalescing, and reranking
    pub optimization_level: OptimizationLevel,
    /// Max entries in the query cache (embedding cache gets half,
    /// metadata cache double)
    pub memory_cache_size: usize,
    /// Default TTL for cached query results, seconds
    pub cache_ttl_seconds: u64,
    /// Max items drained per coalescer tick
    pub batch_size: usize,
    /// Whether the performance log records samples
    pub monitoring_enabled: bool,
    /// Max texts per underlying embedding model call
    pub embedding_batch_size: usize,
    /// Entries in the embedding service's vector cache
    pub embedding_cache_size: usize,
    /// Memories pulled for a trajectory analysis
    pub trajectory_lookback: usize,
    /// Spans shorter than this are flagged as limited data, minutes
    pub trajectory_min_span_minutes: i64,
    /// Search results below this similarity are dropped
    pub relevance_cutoff: f32,
    /// Cadence of the background cache expiry sweep, seconds
    pub cache_sweep_interval_seconds: u64,
    /// Ring buffer capacity for performance samples
    pub max_metric_samples: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            optimization_level: OptimizationLevel::Standard,
            memory_cache_size: 2000,
            cache_ttl_seconds: 300,
            batch_size: 50,
            monitoring_enabled: true,
            embedding_batch_size: 32,
            embedding_cache_size: 1000,
            trajectory_lookback: 15,
            trajectory_min_span_minutes: 5,
            relevance_cutoff: 0.3,
            cache_sweep_interval_seconds: 60,
            max_metric_samples: 10_000,
        }
    }
}

impl CoreConfig {
    /// Validate every field; called once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn nonzero(key: &'static str, value: usize) -> Result<(), ConfigError> {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
            Ok(())
        }

        nonzero("memory_cache_size", self.memory_cache_size)?;
        nonzero("batch_size", self.batch_size)?;
        nonzero("embedding_batch_size", self.embedding_batch_size)?;
        nonzero("embedding_cache_size", self.embedding_cache_size)?;
        nonzero("trajectory_lookback", self.trajectory_lookback)?;
        nonzero("max_metric_samples", self.max_metric_samples)?;
        nonzero("cache_ttl_seconds", self.cache_ttl_seconds as usize)?;
        nonzero(
            "cache_sweep_interval_seconds",
            self.cache_sweep_interval_seconds as usize,
        )?;

        if self.trajectory_min_span_minutes < 0 {
            return Err(ConfigError::InvalidValue {
                key: "trajectory_min_span_minutes",
                reason: "must not be negative".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.relevance_cutoff) {
            return Err(ConfigError::InvalidValue {
                key: "relevance_cutoff",
                reason: format!("{} is outside [0, 1]", self.relevance_cutoff),
            });
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let config = CoreConfig {
            memory_cache_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CoreConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cutoff_range_checked() {
        let config = CoreConfig {
            relevance_cutoff: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: CoreConfig =
            serde_json::from_str(r#"{"optimization_level": "aggressive"}"#).unwrap();
        assert_eq!(config.optimization_level, OptimizationLevel::Aggressive);
        assert_eq!(config.memory_cache_size, 2000);
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let result: Result<CoreConfig, _> =
            serde_json::from_str(r#"{"optimizaton_level": "standard"}"#);
        assert!(result.is_err());
    }
}
