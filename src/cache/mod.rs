//! Expiring key/value store with per-entry TTL and a soft capacity bound.
//! Purging is access-triggered only: an expired entry is dropped when it is
//! read, and all expired entries are swept when an insert finds the store full.
//! Nothing is evicted while still valid, so the store may exceed its capacity
//! by the inserted item.

mod coalesce;

pub use coalesce::CoalescingCache;

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
    /// Write sequence; orders entries for the durable mirror.
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_valid(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) <= self.ttl
    }
}

struct StoreInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    next_seq: u64,
}

/// Snapshot of the store computed by scanning every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
    pub capacity: usize,
}

pub struct ExpiringCacheStore<K, V> {
    inner: Mutex<StoreInner<K, V>>,
    capacity: usize,
    default_ttl: Duration,
}

impl<K, V> ExpiringCacheStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                entries: HashMap::new(),
                next_seq: 0,
            }),
            capacity,
            default_ttl,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Insert or overwrite `key` with the store-wide default TTL.
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Insert or overwrite `key` with an entry-specific TTL.
    /// The TTL clock starts now and is never extended by reads.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if inner.entries.len() >= self.capacity {
            let before = inner.entries.len();
            inner.entries.retain(|_, entry| entry.is_valid(now));
            debug!(
                removed = before - inner.entries.len(),
                remaining = inner.entries.len(),
                capacity = self.capacity,
                "cache capacity sweep"
            );
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
                ttl,
                seq,
            },
        );
    }

    /// Look up a value. Returns None if absent or expired; expired entries are removed.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.is_valid(Instant::now()) => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        inner.entries.remove(key);
        None
    }

    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let now = Instant::now();
        let valid = inner
            .entries
            .values()
            .filter(|entry| entry.is_valid(now))
            .count();
        CacheStats {
            total: inner.entries.len(),
            valid,
            expired: inner.entries.len() - valid,
            capacity: self.capacity,
        }
    }

    /// Valid entries ordered oldest to newest write, keeping only the newest `limit`.
    pub fn recent(&self, limit: usize) -> Vec<(K, V)> {
        let inner = self.inner.lock();
        let now = Instant::now();
        let mut live: Vec<(&K, &CacheEntry<V>)> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_valid(now))
            .collect();
        live.sort_by_key(|(_, entry)| entry.seq);
        let skip = live.len().saturating_sub(limit);
        live.into_iter()
            .skip(skip)
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }
}

impl<V: Clone> ExpiringCacheStore<String, V> {
    /// Remove every entry whose key starts with `prefix`. Returns the count removed.
    pub fn remove_by_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !key.starts_with(prefix));
        before - inner.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(capacity: usize) -> ExpiringCacheStore<String, u32> {
        ExpiringCacheStore::new(capacity, Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_valid_until_ttl_elapses() {
        let store = store(10);
        store.set_with_ttl("k".into(), 1, Duration::from_millis(100));

        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(store.get("k"), Some(1));

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(store.get("k"), None);
        assert_eq!(store.len(), 0, "expired entry is purged on access");
    }

    #[tokio::test(start_paused = true)]
    async fn reads_do_not_extend_ttl() {
        let store = store(10);
        store.set_with_ttl("k".into(), 1, Duration::from_millis(100));
        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(40)).await;
            store.get("k");
        }
        assert!(!store.has("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_at_capacity_drops_only_expired() {
        let store = store(3);
        store.set_with_ttl("a".into(), 1, Duration::from_millis(10));
        store.set("b".into(), 2);
        store.set("c".into(), 3);

        tokio::time::advance(Duration::from_millis(20)).await;
        store.set("d".into(), 4);

        assert_eq!(store.len(), 3);
        assert!(!store.has("a"));
        assert!(store.has("d"));
    }

    #[test]
    fn capacity_is_soft_when_nothing_expired() {
        let store = store(2);
        store.set("a".into(), 1);
        store.set("b".into(), 2);
        store.set("c".into(), 3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("a"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn stats_count_valid_and_expired() {
        let store = store(10);
        store.set_with_ttl("short".into(), 1, Duration::from_millis(10));
        store.set("long".into(), 2);
        tokio::time::advance(Duration::from_millis(20)).await;

        assert_eq!(
            store.stats(),
            CacheStats {
                total: 2,
                valid: 1,
                expired: 1,
                capacity: 10,
            }
        );
    }

    #[test]
    fn delete_and_clear() {
        let store = store(10);
        store.set("a".into(), 1);
        store.set("b".into(), 2);
        assert!(store.delete("a"));
        assert!(!store.delete("a"));
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn recent_orders_by_write_and_truncates() {
        let store = store(10);
        store.set("a".into(), 1);
        store.set("b".into(), 2);
        store.set("c".into(), 3);
        // Overwrite moves "a" to the newest position.
        store.set("a".into(), 10);

        let recent = store.recent(2);
        assert_eq!(recent, vec![("c".to_string(), 3), ("a".to_string(), 10)]);
    }

    #[test]
    fn remove_by_prefix_only_touches_matching_keys() {
        let store = store(10);
        store.set("/search/repositories?q=rust".into(), 1);
        store.set("/search/repositories?q=go".into(), 2);
        store.set("/repos/a/b".into(), 3);

        assert_eq!(store.remove_by_prefix("/search/"), 2);
        assert!(store.has("/repos/a/b"));
    }
}
