use crate::utils::Clock;
use lru::LruCache;
use parking_lot::Mutex;
use std::{num::NonZeroUsize, sync::Arc, time::Duration};
use tokio::time::Instant;

/// Remembers market ids the contract reported as nonexistent.
///
/// Marks expire after their TTL and are pruned lazily on lookup. The bound evicts the
/// oldest mark first so a scan over garbage ids cannot grow it without limit.
pub struct NegativeCache {
    marks: Mutex<LruCache<u64, Instant>>,
    clock: Arc<dyn Clock>,
}

impl NegativeCache {
    #[must_use]
    pub fn new(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self { marks: Mutex::new(LruCache::new(capacity)), clock }
    }

    /// Records `id` as absent until `ttl` from now.
    pub fn mark_absent(&self, id: u64, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        self.marks.lock().push(id, expires_at);
    }

    /// Whether `id` carries a live absence mark.
    pub fn is_absent(&self, id: u64) -> bool {
        let now = self.clock.now();
        let mut marks = self.marks.lock();

        match marks.peek(&id) {
            Some(expires_at) if now < *expires_at => true,
            Some(_) => {
                marks.pop(&id);
                false
            }
            None => false,
        }
    }

    /// Removes the mark for `id`, e.g. once the market has been read successfully.
    pub fn clear(&self, id: u64) {
        self.marks.lock().pop(&id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.marks.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
