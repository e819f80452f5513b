use super::backend::CacheBackend;
use serde::{de::DeserializeOwned, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

/// Shared JSON cache over a [`CacheBackend`].
///
/// Never fails: backend errors, corrupt payloads and oversized values all read as a miss
/// or a skipped write. Keys are namespaced with a versioned prefix.
#[derive(Clone)]
pub struct DistributedCache {
    backend: Arc<dyn CacheBackend>,
    key_prefix: String,
    max_payload_bytes: usize,
}

impl DistributedCache {
    #[must_use]
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        key_prefix: impl Into<String>,
        max_payload_bytes: usize,
    ) -> Self {
        Self { backend, key_prefix: key_prefix.into(), max_payload_bytes }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    #[must_use]
    pub fn is_distributed(&self) -> bool {
        self.backend.is_distributed()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }

    pub async fn get<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let full_key = self.full_key(key);

        let raw = match self.backend.get(&full_key).await {
            Ok(raw) => raw?,
            Err(e) => {
                debug!(key = %full_key, error = %e, "distributed cache read failed");
                return None;
            }
        };

        if raw.len() > self.max_payload_bytes {
            debug!(key = %full_key, size = raw.len(), "ignoring oversized distributed cache entry");
            return None;
        }

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %full_key, error = %e, "discarding corrupt distributed cache entry");
                None
            }
        }
    }

    pub async fn set<V: Serialize + Sync>(&self, key: &str, value: &V, ttl: Duration) {
        let full_key = self.full_key(key);

        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %full_key, error = %e, "failed to serialize cache payload");
                return;
            }
        };

        if payload.len() > self.max_payload_bytes {
            debug!(
                key = %full_key,
                size = payload.len(),
                max = self.max_payload_bytes,
                "payload too large for distributed cache"
            );
            return;
        }

        let ttl_secs = ttl.as_secs().max(1);
        if let Err(e) = self.backend.set_with_expiry(&full_key, &payload, ttl_secs).await {
            debug!(key = %full_key, error = %e, "distributed cache write failed");
        }
    }

    /// Round-trips a read of a key that never exists. `true` when the backend answered.
    pub async fn probe(&self) -> bool {
        self.backend.get(&self.full_key("__probe__")).await.is_ok()
    }
}
