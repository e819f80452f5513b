use crate::utils::Clock;
use lru::LruCache;
use parking_lot::Mutex;
use std::{num::NonZeroUsize, sync::Arc, time::Duration};
use tokio::time::Instant;

/// Freshness classification of a cache hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// `age <= ttl`
    Fresh,
    /// `ttl < age <= stale_ttl`
    Stale,
}

/// A value read back from a [`FreshnessCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit<V> {
    pub freshness: Freshness,
    pub value: V,
    pub age: Duration,
}

impl<V> CacheHit<V> {
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

/// Bounded in-process cache with fresh / stale / expired classification.
///
/// Entries are immutable once written; a second `set` for the same key replaces the entry
/// and resets its age. Reads use `peek`, so the underlying LRU order is insertion order and
/// the bound evicts the oldest write first. Expired entries are pruned when read.
pub struct FreshnessCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    stale_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> FreshnessCache<V> {
    /// Creates a cache holding at most `max_entries` (minimum 1) values.
    #[must_use]
    pub fn new(max_entries: usize, stale_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self { entries: Mutex::new(LruCache::new(capacity)), stale_ttl, clock }
    }

    /// Looks up `key`.
    ///
    /// Returns a fresh hit when `age <= ttl`. Past its TTL an entry is returned as stale only
    /// when `allow_stale` is set and `age <= stale_ttl`; beyond that it is removed.
    pub fn get(&self, key: &str, allow_stale: bool) -> Option<CacheHit<V>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let entry = entries.peek(key)?;
        let age = now.saturating_duration_since(entry.inserted_at);

        if age <= entry.ttl {
            return Some(CacheHit { freshness: Freshness::Fresh, value: entry.value.clone(), age });
        }

        if age <= self.stale_ttl.max(entry.ttl) {
            return allow_stale.then(|| CacheHit {
                freshness: Freshness::Stale,
                value: entry.value.clone(),
                age,
            });
        }

        entries.pop(key);
        None
    }

    /// Stores `value` under `key`, timestamped now.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry { value, inserted_at: self.clock.now(), ttl };
        let evicted = self.entries.lock().push(key.into(), entry);

        if let Some((evicted_key, _)) = evicted {
            tracing::trace!(key = %evicted_key, "evicted oldest cache entry");
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    /// Drops every entry past its stale window. Returns the number removed.
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now();
        let stale_ttl = self.stale_ttl;
        let mut entries = self.entries.lock();

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.inserted_at) > stale_ttl.max(e.ttl))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }

        expired.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
