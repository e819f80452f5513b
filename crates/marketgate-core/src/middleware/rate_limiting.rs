use crate::{
    cache::backend::{BackendError, CacheBackend},
    config::RateLimitConfig,
    utils::Clock,
};
use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tracing::{debug, warn};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Throttled { retry_after_secs: u64 },
}

impl RateLimitDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Clone)]
struct FixedWindow {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl FixedWindow {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window
    }
}

/// Fixed-window rate limiter keyed by `(scope, client)`.
///
/// Counts in the shared backend when it supports increments, so every gateway instance sees
/// the same window. The window TTL is re-asserted on every check, so a counter whose first
/// expiry was lost still expires. Any backend failure falls back to the in-process windows
/// for that check.
///
/// **Security**: Limits tracked clients to prevent OOM from spoofed identities. When the
/// table is full after pruning, checks are allowed rather than rejected.
pub struct RateLimiter {
    windows: Arc<DashMap<String, FixedWindow>>,
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    enabled: bool,
    max_windows: usize,
    cleanup_interval: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(
        config: &RateLimitConfig,
        backend: Arc<dyn CacheBackend>,
        key_prefix: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            backend,
            clock,
            key_prefix: key_prefix.into(),
            enabled: config.enabled,
            max_windows: config.max_tracked_clients.max(1),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_seconds.max(1)),
        }
    }

    /// Limiter that keeps counters in process only.
    #[must_use]
    pub fn in_process(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config, Arc::new(crate::cache::NullBackend), "", clock)
    }

    fn window_key(scope: &str, client: &str) -> String {
        format!("ratelimit:{scope}:{client}")
    }

    /// Counts one request for `client` in `scope` against `limit` per `window_secs`.
    pub async fn check(
        &self,
        scope: &str,
        client: &str,
        limit: u32,
        window_secs: u64,
    ) -> RateLimitDecision {
        if !self.enabled {
            return RateLimitDecision::Allowed;
        }

        let window_secs = window_secs.max(1);
        let key = Self::window_key(scope, client);

        match self.check_shared(&key, limit, window_secs).await {
            Ok(decision) => decision,
            Err(BackendError::Unavailable) => self.check_local(key, limit, window_secs),
            Err(e) => {
                warn!(scope, error = %e, "shared rate limit check failed, using local window");
                self.check_local(key, limit, window_secs)
            }
        }
    }

    async fn check_shared(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
    ) -> Result<RateLimitDecision, BackendError> {
        let shared_key = format!("{}{key}", self.key_prefix);
        let count = self.backend.increment(&shared_key).await?;
        self.backend.expire_if_unset(&shared_key, window_secs).await?;

        if count > i64::from(limit) {
            debug!(key = %shared_key, count, limit, "request throttled");
            return Ok(RateLimitDecision::Throttled { retry_after_secs: window_secs });
        }

        Ok(RateLimitDecision::Allowed)
    }

    fn check_local(&self, key: String, limit: u32, window_secs: u64) -> RateLimitDecision {
        let now = self.clock.now();
        let window = Duration::from_secs(window_secs);

        if !self.windows.contains_key(&key) && self.windows.len() >= self.max_windows {
            self.cleanup_expired_windows();
            if self.windows.len() >= self.max_windows {
                debug!(tracked = self.windows.len(), "rate limit table full, allowing request");
                return RateLimitDecision::Allowed;
            }
        }

        let mut entry = self
            .windows
            .entry(key)
            .or_insert_with(|| FixedWindow { count: 0, window_start: now, window });

        if entry.is_expired(now) {
            entry.count = 0;
            entry.window_start = now;
            entry.window = window;
        }

        if entry.count >= limit {
            let elapsed = now.saturating_duration_since(entry.window_start);
            let remaining = entry.window.saturating_sub(elapsed);
            let retry_after_secs = remaining.as_secs_f64().ceil().max(1.0) as u64;
            return RateLimitDecision::Throttled { retry_after_secs };
        }

        entry.count += 1;
        RateLimitDecision::Allowed
    }

    /// Removes in-process windows that have run out. Returns the number removed.
    pub fn cleanup_expired_windows(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, w| !w.is_expired(now));
        before.saturating_sub(self.windows.len())
    }

    /// Spawns the periodic sweep of expired windows. Stops on shutdown.
    pub fn start_cleanup_task(
        self: &Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let cleanup_interval = self.cleanup_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let removed = limiter.cleanup_expired_windows();
                        if removed > 0 {
                            debug!(removed, "swept expired rate limit windows");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }

    #[must_use]
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
