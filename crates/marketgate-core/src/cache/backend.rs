//! Key/value backends shared by the distributed cache and the rate limiter.
//!
//! ```text
//! CacheBackend (trait)
//!   ├── RedisBackend   <- ConnectionManager, every command under a deadline
//!   ├── MemoryBackend  <- process-local map with expiry, for single-node and tests
//!   └── NullBackend    <- always-miss, increments report Unavailable
//! ```
//!
//! Backends return errors; callers decide whether to swallow them.

use crate::{
    config::RedisConfig,
    utils::{redact_url, Clock},
};
use async_trait::async_trait;
use dashmap::DashMap;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable")]
    Unavailable,

    #[error("backend command timed out after {0:?}")]
    Timeout(Duration),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// Short name used in logs and `/api/cache-status`.
    fn name(&self) -> &'static str;

    /// Whether entries are shared across gateway instances.
    fn is_distributed(&self) -> bool;

    async fn get(&self, key: &str) -> BackendResult<Option<String>>;

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> BackendResult<()>;

    /// Atomically increments `key` and returns the new value.
    async fn increment(&self, key: &str) -> BackendResult<i64>;

    /// Sets a TTL on `key` only when it has none. Repeating the call never extends it.
    async fn expire_if_unset(&self, key: &str, ttl_secs: u64) -> BackendResult<()>;
}

/// Backend used when nothing is configured.
#[derive(Debug, Default)]
pub struct NullBackend;

#[async_trait]
impl CacheBackend for NullBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_distributed(&self) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> BackendResult<Option<String>> {
        Ok(None)
    }

    async fn set_with_expiry(&self, _key: &str, _value: &str, _ttl_secs: u64) -> BackendResult<()> {
        Ok(())
    }

    async fn increment(&self, _key: &str) -> BackendResult<i64> {
        Err(BackendError::Unavailable)
    }

    async fn expire_if_unset(&self, _key: &str, _ttl_secs: u64) -> BackendResult<()> {
        Err(BackendError::Unavailable)
    }
}

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

/// Process-local backend with Redis-like expiry semantics.
pub struct MemoryBackend {
    entries: DashMap<String, MemoryEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { entries: DashMap::new(), clock }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_live(entry: &MemoryEntry, now: Instant) -> bool {
        entry.expires_at.is_none_or(|at| now < at)
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_distributed(&self) -> bool {
        false
    }

    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let now = self.clock.now();
        let live = self
            .entries
            .get(key)
            .map(|entry| Self::is_live(&entry, now).then(|| entry.value.clone()));

        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                self.entries.remove_if(key, |_, e| !Self::is_live(e, now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> BackendResult<()> {
        let expires_at = Some(self.clock.now() + Duration::from_secs(ttl_secs));
        self.entries.insert(key.to_string(), MemoryEntry { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn increment(&self, key: &str) -> BackendResult<i64> {
        let now = self.clock.now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| MemoryEntry { value: "0".to_string(), expires_at: None });

        if !Self::is_live(&entry, now) {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }

        let next = entry.value.parse::<i64>().unwrap_or(0).saturating_add(1);
        entry.value = next.to_string();
        Ok(next)
    }

    async fn expire_if_unset(&self, key: &str, ttl_secs: u64) -> BackendResult<()> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.expires_at.is_none() {
                entry.expires_at = Some(self.clock.now() + Duration::from_secs(ttl_secs));
            }
        }
        Ok(())
    }
}

/// Redis-backed store. Every command runs under `command_timeout`.
#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
    command_timeout: Duration,
}

impl RedisBackend {
    /// Connects to `url` and verifies the server with `PING`, both under deadlines.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the connection cannot be established in
    /// `connect_timeout`, or the server does not answer `PING` in `command_timeout`.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> BackendResult<Self> {
        let client = redis::Client::open(url)?;

        let mut connection =
            tokio::time::timeout(connect_timeout, client.get_connection_manager())
                .await
                .map_err(|_| BackendError::Timeout(connect_timeout))??;

        let _: String = tokio::time::timeout(
            command_timeout,
            redis::cmd("PING").query_async(&mut connection),
        )
        .await
        .map_err(|_| BackendError::Timeout(command_timeout))??;

        Ok(Self { connection, command_timeout })
    }

    async fn bounded<T, F>(&self, fut: F) -> BackendResult<T>
    where
        F: Future<Output = redis::RedisResult<T>> + Send,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(BackendError::Timeout(self.command_timeout)),
        }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn is_distributed(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let mut conn = self.connection.clone();
        self.bounded(async move { conn.get::<_, Option<String>>(key).await }).await
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> BackendResult<()> {
        let mut conn = self.connection.clone();
        self.bounded(async move { conn.set_ex::<_, _, ()>(key, value, ttl_secs).await }).await
    }

    async fn increment(&self, key: &str) -> BackendResult<i64> {
        let mut conn = self.connection.clone();
        self.bounded(async move { conn.incr::<_, _, i64>(key, 1).await }).await
    }

    /// Uses `EXPIRE .. NX`, which needs Redis 7.0 or newer.
    async fn expire_if_unset(&self, key: &str, ttl_secs: u64) -> BackendResult<()> {
        let mut conn = self.connection.clone();
        let seconds = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        let command = redis::cmd("EXPIRE").arg(key).arg(seconds).arg("NX").clone();
        self.bounded(async move {
            let _: i64 = command.query_async(&mut conn).await?;
            Ok::<(), redis::RedisError>(())
        })
        .await
    }
}

/// Builds the backend described by `config`.
///
/// A configured Redis that cannot be reached degrades to the memory backend when
/// `memory_fallback` is set and to [`NullBackend`] otherwise. Never fails startup.
pub async fn connect_backend(config: &RedisConfig, clock: Arc<dyn Clock>) -> Arc<dyn CacheBackend> {
    let url = config.url.trim();

    if url.is_empty() {
        return if config.memory_fallback {
            info!("no redis url configured, using in-process backend");
            Arc::new(MemoryBackend::new(clock))
        } else {
            debug!("no redis url configured, distributed cache disabled");
            Arc::new(NullBackend)
        };
    }

    let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
    let command_timeout = Duration::from_millis(config.command_timeout_ms);

    match RedisBackend::connect(url, connect_timeout, command_timeout).await {
        Ok(backend) => {
            info!(url = %redact_url(url), "connected to redis");
            Arc::new(backend)
        }
        Err(e) => {
            warn!(url = %redact_url(url), error = %e, "redis unavailable, continuing without it");
            if config.memory_fallback {
                Arc::new(MemoryBackend::new(clock))
            } else {
                Arc::new(NullBackend)
            }
        }
    }
}
