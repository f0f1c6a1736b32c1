//! Advanced Cache
//!
//! Generic key/value cache with three eviction strategies:
//! - **LRU**: drop the least-recently-used entry
//! - **TTL**: drop the oldest-by-insertion entry
//! - **Hybrid**: drop up to five expired entries first, else fall back to LRU
//!
//! Recency and insertion order are tracked with monotonic sequence numbers
//! rather than wall-clock time, which keeps eviction deterministic under
//! test. Expired entries are never observably returned: `get` evicts them on
//! contact and a periodic sweep clears the rest.
//!
//! Eviction scans the map. Instances here hold a few thousand entries, so
//! the scan is cheaper than maintaining a separate ordering structure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::debug;

// ============================================================================
// STRATEGY AND ENTRIES
// ============================================================================

/// Cache eviction strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    /// Least Recently Used
    Lru,
    /// Time To Live (oldest insertion evicted first)
    Ttl,
    /// Expired entries first, then LRU
    #[default]
    Hybrid,
}

impl CacheStrategy {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStrategy::Lru => "lru",
            CacheStrategy::Ttl => "ttl",
            CacheStrategy::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    data: V,
    inserted_at: Instant,
    inserted_seq: u64,
    last_used_seq: u64,
    access_count: u64,
    ttl: Option<Duration>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => self.inserted_at.elapsed() >= ttl,
            None => false,
        }
    }
}

/// Up to this many expired entries are dropped per Hybrid eviction
const HYBRID_EXPIRED_EVICTIONS: usize = 5;

// ============================================================================
// STATISTICS
// ============================================================================

/// Cache statistics snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub cleanups: u64,
    /// Hit fraction in `[0, 1]`
    pub hit_rate: f64,
    pub strategy: CacheStrategy,
}

// ============================================================================
// ADVANCED CACHE
// ============================================================================

struct CacheInner<V> {
    map: HashMap<String, CacheEntry<V>>,
    seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    cleanups: u64,
}

/// Generic cache with LRU / TTL / Hybrid eviction.
///
/// `size <= max_size` holds after every `put`; counters are monotonic.
pub struct AdvancedCache<V> {
    name: &'static str,
    max_size: usize,
    default_ttl: Duration,
    strategy: CacheStrategy,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone + Send + 'static> AdvancedCache<V> {
    /// Create a cache. `max_size` of zero is bumped to one.
    pub fn new(
        name: &'static str,
        max_size: usize,
        default_ttl: Duration,
        strategy: CacheStrategy,
    ) -> Self {
        debug!(name, max_size, strategy = %strategy, "cache initialized");
        Self {
            name,
            max_size: max_size.max(1),
            default_ttl,
            strategy,
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                seq: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                cleanups: 0,
            }),
        }
    }

    /// Look up a value. Expired entries are evicted and reported as misses.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();

        let expired = match inner.map.get(key) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(),
        };

        if expired {
            inner.map.remove(key);
            inner.misses += 1;
            return None;
        }

        inner.seq += 1;
        let seq = inner.seq;
        inner.hits += 1;
        let entry = inner.map.get_mut(key)?;
        entry.access_count += 1;
        entry.last_used_seq = seq;
        Some(entry.data.clone())
    }

    /// Insert or overwrite a value. `ttl` of `None` uses the default TTL.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let mut inner = self.lock();
        inner.seq += 1;
        let seq = inner.seq;
        inner.map.insert(
            key.into(),
            CacheEntry {
                data: value,
                inserted_at: Instant::now(),
                inserted_seq: seq,
                last_used_seq: seq,
                access_count: 0,
                ttl: Some(ttl.unwrap_or(self.default_ttl)),
            },
        );

        if inner.map.len() > self.max_size {
            self.evict(&mut inner);
        }
    }

    /// Remove every expired entry; returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .map
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.map.remove(key);
        }
        if !expired.is_empty() {
            inner.cleanups += 1;
            debug!(cache = self.name, cleaned = expired.len(), "expired entries removed");
        }
        expired.len()
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let total = inner.hits + inner.misses;
        CacheStats {
            size: inner.map.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            cleanups: inner.cleanups,
            hit_rate: if total > 0 {
                inner.hits as f64 / total as f64
            } else {
                0.0
            },
            strategy: self.strategy,
        }
    }

    /// Number of live entries (expired-but-unswept included)
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the periodic expiry sweep.
    ///
    /// The task runs until aborted; the owning component holds the handle
    /// and aborts it on shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tick.tick().await; // immediate first tick is a no-op sweep
            loop {
                tick.tick().await;
                cache.cleanup_expired();
            }
        })
    }

    // ========================================================================
    // PRIVATE
    // ========================================================================

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict(&self, inner: &mut CacheInner<V>) {
        match self.strategy {
            CacheStrategy::Lru => Self::evict_min_by(inner, |e| e.last_used_seq),
            CacheStrategy::Ttl => Self::evict_min_by(inner, |e| e.inserted_seq),
            CacheStrategy::Hybrid => {
                let expired: Vec<String> = inner
                    .map
                    .iter()
                    .filter(|(_, entry)| entry.is_expired())
                    .take(HYBRID_EXPIRED_EVICTIONS)
                    .map(|(key, _)| key.clone())
                    .collect();
                if expired.is_empty() {
                    Self::evict_min_by(inner, |e| e.last_used_seq);
                } else {
                    for key in expired {
                        inner.map.remove(&key);
                        inner.evictions += 1;
                    }
                }
            }
        }
    }

    fn evict_min_by(inner: &mut CacheInner<V>, order: impl Fn(&CacheEntry<V>) -> u64) {
        let victim = inner
            .map
            .iter()
            .min_by_key(|(_, entry)| order(entry))
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            inner.map.remove(&key);
            inner.evictions += 1;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(strategy: CacheStrategy, max_size: usize) -> AdvancedCache<i32> {
        AdvancedCache::new("test", max_size, Duration::from_secs(300), strategy)
    }

    #[test]
    fn test_get_put_roundtrip() {
        let c = cache(CacheStrategy::Hybrid, 10);
        assert_eq!(c.get("a"), None);
        c.put("a", 1, None);
        assert_eq!(c.get("a"), Some(1));

        let stats = c.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_size_never_exceeds_max() {
        let c = cache(CacheStrategy::Lru, 3);
        for i in 0..20 {
            c.put(format!("k{i}"), i, None);
            assert!(c.len() <= 3, "size exceeded max after put {i}");
        }
        assert_eq!(c.stats().evictions, 17);
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let c = cache(CacheStrategy::Lru, 2);
        c.put("a", 1, None);
        c.put("b", 2, None);
        c.get("a"); // refresh a
        c.put("c", 3, None); // evicts b

        assert_eq!(c.get("a"), Some(1));
        assert_eq!(c.get("b"), None);
        assert_eq!(c.get("c"), Some(3));
    }

    #[test]
    fn test_ttl_strategy_evicts_oldest_insertion() {
        let c = cache(CacheStrategy::Ttl, 2);
        c.put("a", 1, None);
        c.put("b", 2, None);
        c.get("a"); // recency must not matter for TTL strategy
        c.put("c", 3, None); // evicts a (oldest insertion)

        assert_eq!(c.get("a"), None);
        assert_eq!(c.get("b"), Some(2));
    }

    #[test]
    fn test_expired_entry_is_never_returned() {
        let c = cache(CacheStrategy::Hybrid, 10);
        c.put("a", 1, Some(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(c.get("a"), None);
        assert_eq!(c.stats().misses, 1);
    }

    #[test]
    fn test_hybrid_prefers_expired_over_lru() {
        let c = cache(CacheStrategy::Hybrid, 3);
        c.put("old", 0, Some(Duration::ZERO));
        c.put("a", 1, None);
        c.put("b", 2, None);
        std::thread::sleep(Duration::from_millis(2));
        c.put("c", 3, None); // over capacity: expired "old" goes first

        assert_eq!(c.get("old"), None);
        assert_eq!(c.get("a"), Some(1));
        assert_eq!(c.get("b"), Some(2));
        assert_eq!(c.get("c"), Some(3));
    }

    #[test]
    fn test_cleanup_expired_counts() {
        let c = cache(CacheStrategy::Hybrid, 10);
        c.put("a", 1, Some(Duration::ZERO));
        c.put("b", 2, Some(Duration::ZERO));
        c.put("c", 3, None);
        std::thread::sleep(Duration::from_millis(2));

        assert_eq!(c.cleanup_expired(), 2);
        assert_eq!(c.len(), 1);
        assert_eq!(c.stats().cleanups, 1);
        assert_eq!(c.cleanup_expired(), 0);
    }

    #[test]
    fn test_overwrite_same_key_keeps_size() {
        let c = cache(CacheStrategy::Lru, 2);
        c.put("a", 1, None);
        c.put("a", 2, None);
        assert_eq!(c.len(), 1);
        assert_eq!(c.get("a"), Some(2));
    }

    #[test]
    fn test_exactly_one_eviction_at_capacity() {
        let c = cache(CacheStrategy::Lru, 5);
        for i in 0..5 {
            c.put(format!("k{i}"), i, None);
        }
        let before = c.stats().evictions;
        c.put("extra", 99, None);
        let stats = c.stats();
        assert_eq!(stats.evictions, before + 1);
        assert_eq!(stats.size, 5);
    }

    #[tokio::test]
    async fn test_sweeper_clears_expired_entries() {
        let c = Arc::new(cache(CacheStrategy::Hybrid, 10));
        c.put("a", 1, Some(Duration::ZERO));
        let handle = c.spawn_sweeper(Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(c.len(), 0);
        handle.abort();
    }
}
