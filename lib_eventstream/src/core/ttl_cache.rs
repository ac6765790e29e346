//! # TTL Cache
//!
//! A thread-safe key/value store where every entry carries its own expiry.
//!
//! ## Semantics:
//! - `get`/`has` never return an entry whose deadline has passed. An expired
//!   entry found on access is purged on the spot.
//! - `set` replaces value and deadline in one step under the lock, so a
//!   concurrent `get` observes either the old entry or the new one.
//! - Keys that are never read again would otherwise live forever, so a
//!   background sweep ([`TtlCache::start_reaper`]) drops expired entries on a
//!   fixed cadence.
//! - There is no size bound or LRU policy; key cardinality is bounded by the
//!   callers (request signatures).
//!
//! Time is measured with `tokio::time::Instant`, so paused-clock tests can
//! drive expiry deterministically.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Snapshot of the cache population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
}

pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Debug,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value` under `key`, expiring `ttl` from now. Overwrites any existing entry.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        log::debug!("Cache set: {:?} (expires in {}s)", key, ttl.as_secs_f64());
        self.lock().insert(key, CacheEntry { value, expires_at });
    }

    /// Returns the value if present and unexpired, purging it otherwise.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Removes `key`, returning whether an entry (fresh or not) was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
        log::debug!("Cache cleared");
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            log::debug!("Cache cleanup: removed {} expired entries", removed);
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.lock();
        let expired = entries.values().filter(|e| e.is_expired(now)).count();
        CacheStats {
            total: entries.len(),
            active: entries.len() - expired,
            expired,
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Debug + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Spawns the background sweep on the current tokio runtime.
    ///
    /// The task holds only a weak reference: it ends when the returned token is
    /// cancelled or when the last strong reference to the cache is dropped.
    /// A zero period is raised to one millisecond.
    pub fn start_reaper(self: &Arc<Self>, every: Duration) -> CancellationToken {
        let every = every.max(Duration::from_millis(1));
        let token = CancellationToken::new();
        let stop = token.clone();
        let cache = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(cache) = cache.upgrade() else { break };
                        cache.purge_expired();
                    }
                }
            }
            log::debug!("Cache reaper stopped");
        });

        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn value_is_served_until_the_deadline() {
        let cache = TtlCache::new();
        cache.set("k".to_string(), "v".to_string(), Duration::from_millis(100));

        advance(Duration::from_millis(50)).await;
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert!(cache.has("k"));

        advance(Duration::from_millis(100)).await;
        assert_eq!(cache.get("k"), None);
        assert!(!cache.has("k"));
        assert!(cache.is_empty(), "expired entry is purged on access");
    }

    #[tokio::test(start_paused = true)]
    async fn set_replaces_value_and_deadline() {
        let cache = TtlCache::new();
        cache.set("k", 1, Duration::from_millis(100));
        advance(Duration::from_millis(80)).await;
        cache.set("k", 2, Duration::from_millis(100));

        advance(Duration::from_millis(50)).await;
        assert_eq!(cache.get("k"), Some(2));

        advance(Duration::from_millis(60)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_clear_and_stats() {
        let cache = TtlCache::new();
        cache.set("a", 1, Duration::from_secs(10));
        cache.set("b", 2, Duration::from_secs(1));
        cache.set("c", 3, Duration::from_secs(10));

        advance(Duration::from_secs(2)).await;
        assert_eq!(
            cache.stats(),
            CacheStats {
                total: 3,
                active: 2,
                expired: 1
            }
        );

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_reclaims_keys_nobody_reads() {
        let cache = Arc::new(TtlCache::new());
        let token = cache.start_reaper(Duration::from_secs(60));
        cache.set("never-read", 1, Duration::from_secs(5));
        cache.set("long-lived", 2, Duration::from_secs(600));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long-lived"), Some(2));

        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_reaper_period_is_clamped() {
        let cache = Arc::new(TtlCache::new());
        let token = cache.start_reaper(Duration::ZERO);
        cache.set("short", 1, Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.is_empty());

        token.cancel();
    }

    #[test]
    fn concurrent_readers_and_writers_never_see_torn_entries() {
        let cache = Arc::new(TtlCache::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        cache.set(i % 16, (w, i), Duration::from_secs(60));
                    }
                })
            })
            .collect();
        let reader = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..2000 {
                    if let Some((_, n)) = cache.get(&(i % 16)) {
                        assert_eq!(n % 16, i % 16);
                    }
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(cache.len(), 16);
    }
}
