//! Performance Log
//!
//! Bounded ring buffer of per-operation samples with windowed aggregation.
//! Nothing here persists; the buffer exists to answer "how has the memory
//! layer behaved over the last hour" without external infrastructure.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{ProcessesToUpdate, System};

// ============================================================================
// SAMPLES
// ============================================================================

/// Default ring buffer capacity
pub const DEFAULT_MAX_SAMPLES: usize = 10_000;

/// One recorded operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    /// What ran ("search_memories", "store_conversation", ...)
    pub operation_type: String,
    /// How long it took
    pub duration: Duration,
    /// Whether a cache served the request
    pub cache_hit: bool,
    /// How many items the operation covered
    pub batch_size: usize,
    /// Process resident memory at sample time, 0.0 when unavailable
    pub memory_usage_mb: f64,
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// AGGREGATES
// ============================================================================

/// Aggregated statistics for one operation type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStats {
    pub count: usize,
    pub avg_duration: Duration,
    /// Fraction of operations served from cache, `[0, 1]`
    pub cache_hit_rate: f64,
    pub avg_batch_size: f64,
    pub avg_memory_mb: f64,
    pub peak_memory_mb: f64,
}

/// Windowed aggregate across all operation types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub window: Duration,
    pub total_operations: usize,
    /// Fraction of all operations served from cache, `[0, 1]`
    pub overall_cache_hit_rate: f64,
    pub operations: BTreeMap<String, OperationStats>,
}

// ============================================================================
// PERFORMANCE LOG
// ============================================================================

/// Bounded ring buffer of performance samples.
pub struct PerformanceLog {
    enabled: bool,
    max_samples: usize,
    samples: Mutex<VecDeque<PerformanceSample>>,
    system: Mutex<System>,
}

impl PerformanceLog {
    /// Create a log. When `enabled` is false, `record` is a no-op.
    pub fn new(enabled: bool, max_samples: usize) -> Self {
        Self {
            enabled,
            max_samples: max_samples.max(1),
            samples: Mutex::new(VecDeque::new()),
            system: Mutex::new(System::new()),
        }
    }

    /// Whether recording is active
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append a sample, discarding the oldest on overflow.
    pub fn record(&self, sample: PerformanceSample) {
        if !self.enabled {
            return;
        }
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        samples.push_back(sample);
        while samples.len() > self.max_samples {
            samples.pop_front();
        }
    }

    /// Record an operation measured from `started`, stamping memory usage.
    pub fn sample(&self, operation_type: &str, started: Instant, cache_hit: bool, batch_size: usize) {
        if !self.enabled {
            return;
        }
        self.record(PerformanceSample {
            operation_type: operation_type.to_string(),
            duration: started.elapsed(),
            cache_hit,
            batch_size,
            memory_usage_mb: self.memory_usage_mb(),
            timestamp: Utc::now(),
        });
    }

    /// Current process resident memory in MB, 0.0 when unavailable.
    pub fn memory_usage_mb(&self) -> f64 {
        let Ok(pid) = sysinfo::get_current_pid() else {
            return 0.0;
        };
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system
            .process(pid)
            .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0)
    }

    /// Samples currently held
    pub fn len(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate samples recorded within the last `window`.
    pub fn aggregate(&self, window: Duration) -> PerformanceReport {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::hours(1));

        struct Rollup {
            count: usize,
            total_duration: Duration,
            cache_hits: usize,
            total_batch: usize,
            total_mem: f64,
            peak_mem: f64,
        }

        let mut rollups: BTreeMap<String, Rollup> = BTreeMap::new();
        {
            let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
            for sample in samples.iter().filter(|s| s.timestamp >= cutoff) {
                let rollup = rollups
                    .entry(sample.operation_type.clone())
                    .or_insert(Rollup {
                        count: 0,
                        total_duration: Duration::ZERO,
                        cache_hits: 0,
                        total_batch: 0,
                        total_mem: 0.0,
                        peak_mem: 0.0,
                    });
                rollup.count += 1;
                rollup.total_duration += sample.duration;
                if sample.cache_hit {
                    rollup.cache_hits += 1;
                }
                rollup.total_batch += sample.batch_size;
                rollup.total_mem += sample.memory_usage_mb;
                rollup.peak_mem = rollup.peak_mem.max(sample.memory_usage_mb);
            }
        }

        let total_operations: usize = rollups.values().map(|r| r.count).sum();
        let total_hits: usize = rollups.values().map(|r| r.cache_hits).sum();

        let operations = rollups
            .into_iter()
            .map(|(op, r)| {
                let count = r.count.max(1) as u32;
                (
                    op,
                    OperationStats {
                        count: r.count,
                        avg_duration: r.total_duration / count,
                        cache_hit_rate: r.cache_hits as f64 / r.count.max(1) as f64,
                        avg_batch_size: r.total_batch as f64 / r.count.max(1) as f64,
                        avg_memory_mb: r.total_mem / r.count.max(1) as f64,
                        peak_memory_mb: r.peak_mem,
                    },
                )
            })
            .collect();

        PerformanceReport {
            window,
            total_operations,
            overall_cache_hit_rate: if total_operations > 0 {
                total_hits as f64 / total_operations as f64
            } else {
                0.0
            },
            operations,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(op: &str, cache_hit: bool, batch: usize) -> PerformanceSample {
        PerformanceSample {
            operation_type: op.to_string(),
            duration: Duration::from_millis(10),
            cache_hit,
            batch_size: batch,
            memory_usage_mb: 100.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_ring_buffer_discards_oldest() {
        let log = PerformanceLog::new(true, 3);
        for i in 0..5 {
            log.record(sample(&format!("op{i}"), false, 1));
        }
        assert_eq!(log.len(), 3);

        let report = log.aggregate(Duration::from_secs(3600));
        assert!(!report.operations.contains_key("op0"));
        assert!(!report.operations.contains_key("op1"));
        assert!(report.operations.contains_key("op4"));
    }

    #[test]
    fn test_disabled_log_records_nothing() {
        let log = PerformanceLog::new(false, 10);
        log.record(sample("search", false, 1));
        log.sample("search", Instant::now(), false, 1);
        assert!(log.is_empty());
    }

    #[test]
    fn test_aggregate_per_operation() {
        let log = PerformanceLog::new(true, 100);
        log.record(sample("search_memories", true, 5));
        log.record(sample("search_memories", false, 5));
        log.record(sample("store_conversation", false, 1));

        let report = log.aggregate(Duration::from_secs(3600));
        assert_eq!(report.total_operations, 3);

        let search = &report.operations["search_memories"];
        assert_eq!(search.count, 2);
        assert!((search.cache_hit_rate - 0.5).abs() < 1e-9);
        assert!((search.avg_batch_size - 5.0).abs() < 1e-9);
        assert!((search.peak_memory_mb - 100.0).abs() < 1e-9);

        assert!((report.overall_cache_hit_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_window_excludes_old_samples() {
        let log = PerformanceLog::new(true, 100);
        let mut old = sample("search_memories", false, 1);
        old.timestamp = Utc::now() - chrono::Duration::hours(2);
        log.record(old);
        log.record(sample("search_memories", false, 1));

        let report = log.aggregate(Duration::from_secs(3600));
        assert_eq!(report.total_operations, 1);
    }

    #[test]
    fn test_empty_aggregate() {
        let log = PerformanceLog::new(true, 100);
        let report = log.aggregate(Duration::from_secs(3600));
        assert_eq!(report.total_operations, 0);
        assert_eq!(report.overall_cache_hit_rate, 0.0);
        assert!(report.operations.is_empty());
    }
}
