//! In-memory request cache with per-record TTL

use crate::{CacheConfig, Clock, TokioClock};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

/// A cached value with its insertion time and lifetime
#[derive(Debug, Clone)]
pub struct CacheRecord<V> {
    pub value: V,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheRecord<V> {
    /// Expired once strictly more than `ttl` has passed
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) > self.ttl
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Records currently held (expired ones included until evicted)
    pub entries: usize,
    /// Cache hits
    pub hits: u64,
    /// Cache misses (absent or expired)
    pub misses: u64,
    /// Records removed because they expired
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct CacheStatsInner {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Best-effort memoization of request results keyed by string.
///
/// Expired records are never returned. They are dropped lazily by `get`, or
/// in bulk by `cleanup`, which `spawn_cleanup` runs periodically.
pub struct RequestCache<V> {
    records: DashMap<String, CacheRecord<V>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    stats: CacheStatsInner,
}

impl<V: Clone + Send + Sync + 'static> RequestCache<V> {
    /// Create a cache on the tokio clock
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    /// Create a cache on an explicit clock
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            default_ttl: config.default_ttl,
            clock,
            stats: CacheStatsInner::default(),
        }
    }

    /// Store with the default TTL, replacing any previous record
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Store with an explicit TTL, replacing any previous record
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let record = CacheRecord {
            value,
            inserted_at: self.clock.now(),
            ttl,
        };
        self.records.insert(key.into(), record);
    }

    /// Fetch a live value; an expired record is evicted on the way
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();

        if let Some(record) = self.records.get(key) {
            if !record.is_expired(now) {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(record.value.clone());
            }
        }

        // Guard dropped above; removing while holding it would deadlock the shard.
        if self
            .records
            .remove_if(key, |_, record| record.is_expired(now))
            .is_some()
        {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Remove every record
    pub fn clear(&self) {
        self.records.clear();
    }

    /// Evict every expired record, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        let evicted = before.saturating_sub(self.records.len());

        if evicted > 0 {
            self.stats
                .evictions
                .fetch_add(evicted as u64, Ordering::Relaxed);
            debug!("Request cache cleanup evicted {} records", evicted);
        }
        evicted
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.records.len(),
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
        }
    }

    /// Run `cleanup` every `interval` until the returned handle is shut down
    /// or dropped. Must be called inside a tokio runtime.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> CleanupHandle {
        let cache = Arc::downgrade(self);
        let period = interval.max(Duration::from_millis(1));

        // Ticks on tokio time; expiry is still judged by the cache's clock.
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.cleanup();
                    }
                    None => break,
                }
            }
        });

        CleanupHandle { task: Some(task) }
    }
}

/// Handle to the periodic cleanup task
#[derive(Debug)]
pub struct CleanupHandle {
    task: Option<JoinHandle<()>>,
}

impl CleanupHandle {
    /// Stop the cleanup task
    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether the task is still scheduled
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    fn cache_with_clock(ttl: Duration) -> (RequestCache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig {
            default_ttl: ttl,
            ..Default::default()
        };
        (RequestCache::with_clock(&config, clock.clone()), clock)
    }

    #[test]
    fn test_set_get() {
        let (cache, _clock) = cache_with_clock(Duration::from_secs(60));
        cache.set("products:page=1", "[..]".to_string());
        assert_eq!(cache.get("products:page=1").as_deref(), Some("[..]"));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_expired_record_evicted_on_get() {
        let (cache, clock) = cache_with_clock(Duration::from_secs(60));
        cache.set("k", "v".to_string());

        clock.advance(Duration::from_secs(60));
        assert!(cache.get("k").is_some());

        clock.advance(Duration::from_millis(1));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_set_overwrites_and_resets_age() {
        let (cache, clock) = cache_with_clock(Duration::from_secs(10));
        cache.set("k", "old".to_string());
        clock.advance(Duration::from_secs(8));
        cache.set("k", "new".to_string());
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get("k").as_deref(), Some("new"));
    }

    #[test]
    fn test_cleanup_removes_only_expired() {
        let (cache, clock) = cache_with_clock(Duration::from_secs(10));
        cache.set("short", "a".to_string());
        cache.set_with_ttl("long", "b".to_string(), Duration::from_secs(100));

        clock.advance(Duration::from_secs(11));
        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("long").is_some());
    }

    #[test]
    fn test_clear() {
        let (cache, _clock) = cache_with_clock(Duration::from_secs(10));
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_cleanup_and_shutdown() {
        let config = CacheConfig {
            default_ttl: Duration::from_secs(1),
            ..Default::default()
        };
        let cache: Arc<RequestCache<u32>> = Arc::new(RequestCache::new(&config));
        cache.set("k", 7);

        let mut handle = cache.spawn_cleanup(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(cache.is_empty());

        handle.shutdown();
        assert!(!handle.is_running());
    }
}
