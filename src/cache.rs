// =============================================================================
// SmartCache — bounded LRU with per-entry TTL and pressure eviction
// =============================================================================
//
// Design:
//   - One mutex around the inner map + LRU order list; every operation is a
//     short critical section.
//   - The order list is append-only under churn: touching a key pushes a
//     duplicate to the back instead of repositioning in place. Eviction pops
//     stale fronts lazily, and when the list grows past 1.5x the map size it
//     is rebuilt from the map sorted by last access.
//   - Entry size comes from the serialized form; values that refuse to
//     serialize fall back to a 1 KB floor. No cache operation ever fails.
//   - A background task sweeps expired entries and, when the byte footprint
//     crosses 85% of the budget, evicts the oldest 30% of entries and
//     shrinks the backing storage.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Byte floor charged for values whose size cannot be estimated.
const SIZE_FLOOR_BYTES: usize = 1024;

/// Byte-budget fraction above which the cleanup sweep sheds load.
const PRESSURE_THRESHOLD: f64 = 0.85;

/// Fraction of entries dropped by a pressure eviction.
const PRESSURE_EVICT_FRACTION: f64 = 0.30;

struct Entry<T> {
    value: T,
    expires_at: Instant,
    bytes: usize,
    last_accessed: Instant,
}

struct Inner<T> {
    map: HashMap<String, Entry<T>>,
    /// LRU order, least-recent at the front. May contain duplicates for
    /// touched keys; the front is cleaned lazily.
    order: VecDeque<String>,
    size_bytes: usize,
}

/// Serializable snapshot of cache metrics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size_bytes: usize,
    pub item_count: usize,
    pub hit_rate: f64,
    pub oldest_item_age_secs: f64,
}

/// Bounded, TTL-aware LRU cache.
pub struct SmartCache<T> {
    name: String,
    inner: Mutex<Inner<T>>,
    max_items: usize,
    max_bytes: usize,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<T: Clone + Serialize + Send + Sync + 'static> SmartCache<T> {
    pub fn new(name: impl Into<String>, max_items: usize, max_bytes: usize, default_ttl: Duration) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                size_bytes: 0,
            }),
            max_items: max_items.max(1),
            max_bytes: max_bytes.max(SIZE_FLOOR_BYTES),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    // -------------------------------------------------------------------------
    // Core operations
    // -------------------------------------------------------------------------

    /// Insert or replace `key`, evicting least-recently-used entries until
    /// the new entry fits under both budgets.
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Option<Duration>) {
        let key = key.into();
        let bytes = Self::estimate_bytes(&value);
        let now = Instant::now();
        let entry = Entry {
            value,
            expires_at: now + ttl.unwrap_or(self.default_ttl),
            bytes,
            last_accessed: now,
        };

        let mut inner = self.inner.lock();

        if let Some(old) = inner.map.insert(key.clone(), entry) {
            inner.size_bytes = inner.size_bytes.saturating_sub(old.bytes);
        }
        inner.size_bytes += bytes;
        inner.order.push_back(key);

        // Evict until the budgets hold again; the entry just inserted sits at
        // the back of the order list and is only shed once it is the last one
        // standing.
        while inner.map.len() > self.max_items
            || (inner.size_bytes > self.max_bytes && inner.map.len() > 1)
        {
            if !self.evict_lru(&mut inner) {
                break;
            }
        }

        self.maybe_rebuild_order(&mut inner);
    }

    /// Fetch a fresh value, promoting the key to most-recently-used.
    /// Expired entries are deleted and reported as misses.
    pub fn get(&self, key: &str) -> Option<T> {
        enum Lookup<T> {
            Fresh(T),
            Expired,
            Absent,
        }

        let mut inner = self.inner.lock();
        let now = Instant::now();

        let lookup = match inner.map.get_mut(key) {
            None => Lookup::Absent,
            Some(entry) if entry.expires_at <= now => Lookup::Expired,
            Some(entry) => {
                entry.last_accessed = now;
                Lookup::Fresh(entry.value.clone())
            }
        };

        match lookup {
            Lookup::Fresh(value) => {
                inner.order.push_back(key.to_string());
                self.maybe_rebuild_order(&mut inner);
                drop(inner);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Lookup::Expired => {
                if let Some(old) = inner.map.remove(key) {
                    inner.size_bytes = inner.size_bytes.saturating_sub(old.bytes);
                }
                drop(inner);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Absent => {
                drop(inner);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Freshness check without touching hit/miss counters or LRU order.
    pub fn has(&self, key: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .map
            .get(key)
            .is_some_and(|e| e.expires_at > Instant::now())
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.map.remove(key) {
            Some(old) => {
                inner.size_bytes = inner.size_bytes.saturating_sub(old.bytes);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
        inner.size_bytes = 0;
    }

    // -------------------------------------------------------------------------
    // Metrics
    // -------------------------------------------------------------------------

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };
        let oldest_item_age_secs = inner
            .map
            .values()
            .map(|e| e.last_accessed.elapsed().as_secs_f64())
            .fold(0.0_f64, f64::max);

        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            size_bytes: inner.size_bytes,
            item_count: inner.map.len(),
            hit_rate,
            oldest_item_age_secs,
        }
    }

    // -------------------------------------------------------------------------
    // Cleanup
    // -------------------------------------------------------------------------

    /// One maintenance pass: drop expired entries, then shed the oldest 30%
    /// when the byte footprint is above the pressure threshold.
    pub fn cleanup(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let expired: Vec<String> = inner
            .map
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            if let Some(old) = inner.map.remove(key) {
                inner.size_bytes = inner.size_bytes.saturating_sub(old.bytes);
            }
        }

        let pressured = inner.size_bytes as f64 > self.max_bytes as f64 * PRESSURE_THRESHOLD;
        if pressured {
            let to_evict =
                ((inner.map.len() as f64 * PRESSURE_EVICT_FRACTION).ceil() as usize).max(1);
            warn!(
                cache = %self.name,
                size_bytes = inner.size_bytes,
                to_evict,
                "cache under memory pressure, shedding oldest entries"
            );
            for _ in 0..to_evict {
                if !self.evict_lru(&mut inner) {
                    break;
                }
            }
            // Allocator hint after a mass eviction.
            inner.map.shrink_to_fit();
            inner.order.shrink_to_fit();
        }

        self.maybe_rebuild_order(&mut inner);

        if !expired.is_empty() || pressured {
            debug!(
                cache = %self.name,
                expired = expired.len(),
                items = inner.map.len(),
                size_bytes = inner.size_bytes,
                "cache cleanup pass complete"
            );
        }
    }

    /// Spawn the periodic cleanup task. Exits when `shutdown` flips to true.
    pub fn spawn_cleanup(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => cache.cleanup(),
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!(cache = %cache.name, "cache cleanup task stopping");
                            break;
                        }
                    }
                }
            }
        })
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    /// Pop order-list fronts until a live key is found and evict it.
    /// Returns false when nothing evictable remains.
    fn evict_lru(&self, inner: &mut Inner<T>) -> bool {
        while let Some(key) = inner.order.pop_front() {
            if !inner.map.contains_key(&key) {
                continue; // deleted or replaced since this append
            }
            if inner.order.contains(&key) {
                continue; // a fresher touch of this key sits later in the list
            }
            if let Some(old) = inner.map.remove(&key) {
                inner.size_bytes = inner.size_bytes.saturating_sub(old.bytes);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    /// Rebuild the order list from the map when duplicate appends have let
    /// it grow past 1.5x the live entry count.
    fn maybe_rebuild_order(&self, inner: &mut Inner<T>) {
        if inner.order.len() <= inner.map.len().saturating_mul(3) / 2 {
            return;
        }
        let mut keys: Vec<(Instant, String)> = inner
            .map
            .iter()
            .map(|(k, e)| (e.last_accessed, k.clone()))
            .collect();
        keys.sort_by_key(|(at, _)| *at);
        inner.order = keys.into_iter().map(|(_, k)| k).collect();
        debug!(cache = %self.name, len = inner.order.len(), "LRU order list rebuilt");
    }

    /// Serialized-form size with the 1 KB floor for unserializable values.
    fn estimate_bytes(value: &T) -> usize {
        match serde_json::to_vec(value) {
            Ok(buf) => buf.len().max(1),
            Err(_) => SIZE_FLOOR_BYTES,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_items: usize, max_bytes: usize) -> SmartCache<String> {
        SmartCache::new("test", max_items, max_bytes, Duration::from_secs(60))
    }

    #[test]
    fn set_get_roundtrip() {
        let c = cache(10, 1 << 20);
        c.set("a", "alpha".to_string(), None);
        assert_eq!(c.get("a"), Some("alpha".to_string()));
        assert_eq!(c.get("b"), None);
    }

    #[test]
    fn hit_rate_tracks_hits_over_lookups() {
        let c = cache(10, 1 << 20);
        c.set("a", "x".to_string(), None);
        assert!(c.get("a").is_some()); // hit
        assert!(c.get("a").is_some()); // hit
        assert!(c.get("z").is_none()); // miss

        let stats = c.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn ttl_expiry_deletes_and_misses() {
        let c = cache(10, 1 << 20);
        c.set("a", "x".to_string(), Some(Duration::from_millis(20)));
        assert!(c.has("a"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(!c.has("a"));
        assert_eq!(c.get("a"), None);
        assert_eq!(c.stats().item_count, 0);
        assert_eq!(c.stats().misses, 1);
    }

    #[test]
    fn item_budget_evicts_least_recently_used() {
        let c = cache(3, 1 << 20);
        c.set("a", "1".to_string(), None);
        c.set("b", "2".to_string(), None);
        c.set("c", "3".to_string(), None);

        // Touch "a" so "b" becomes the LRU entry.
        assert!(c.get("a").is_some());
        c.set("d", "4".to_string(), None);

        assert_eq!(c.stats().item_count, 3);
        assert!(c.has("a"));
        assert!(!c.has("b"));
        assert!(c.has("c"));
        assert!(c.has("d"));
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn byte_budget_holds() {
        // Strings serialize to len + 2 quote bytes.
        let c = cache(100, 64);
        for i in 0..10 {
            c.set(format!("k{i}"), "0123456789".to_string(), None);
        }
        let stats = c.stats();
        assert!(stats.size_bytes <= 64, "size {}", stats.size_bytes);
        assert!(stats.evictions > 0);
        assert!(stats.item_count < 10);
    }

    #[test]
    fn replacing_a_key_does_not_double_count_bytes() {
        let c = cache(10, 1 << 20);
        c.set("a", "0123456789".to_string(), None);
        let first = c.stats().size_bytes;
        c.set("a", "0123456789".to_string(), None);
        assert_eq!(c.stats().size_bytes, first);
        assert_eq!(c.stats().item_count, 1);
    }

    #[test]
    fn delete_and_clear() {
        let c = cache(10, 1 << 20);
        c.set("a", "x".to_string(), None);
        c.set("b", "y".to_string(), None);
        assert!(c.delete("a"));
        assert!(!c.delete("a"));
        c.clear();
        let stats = c.stats();
        assert_eq!(stats.item_count, 0);
        assert_eq!(stats.size_bytes, 0);
    }

    #[test]
    fn cleanup_drops_expired_entries() {
        let c = cache(10, 1 << 20);
        c.set("a", "x".to_string(), Some(Duration::from_millis(10)));
        c.set("b", "y".to_string(), Some(Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(30));
        c.cleanup();
        let stats = c.stats();
        assert_eq!(stats.item_count, 1);
        assert!(c.has("b"));
    }

    #[test]
    fn cleanup_sheds_oldest_under_pressure() {
        // 10-byte payloads (12 serialized); budget 200 => pressure above 170.
        let c = cache(100, 200);
        for i in 0..15 {
            c.set(format!("k{i:02}"), "0123456789".to_string(), None);
        }
        let before = c.stats().item_count;
        assert_eq!(before, 15);
        c.cleanup();
        let after = c.stats().item_count;
        assert!(after < before, "expected pressure eviction: {before} -> {after}");
        // The newest entry must survive.
        assert!(c.has("k14"));
    }

    #[test]
    fn order_list_rebuild_self_heals() {
        let c = cache(10, 1 << 20);
        c.set("a", "x".to_string(), None);
        c.set("b", "y".to_string(), None);
        // Hammer the same keys; duplicate appends would grow unbounded
        // without the rebuild.
        for _ in 0..100 {
            let _ = c.get("a");
            let _ = c.get("b");
        }
        let inner = c.inner.lock();
        assert!(
            inner.order.len() <= 3,
            "order list grew to {}",
            inner.order.len()
        );
    }

    #[tokio::test]
    async fn cleanup_task_honors_shutdown() {
        let c = Arc::new(cache(10, 1 << 20));
        let (tx, rx) = watch::channel(false);
        let handle = c.spawn_cleanup(Duration::from_millis(10), rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cleanup task did not stop")
            .unwrap();
    }
}
