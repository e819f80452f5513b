//! Caching tiers for the read gateway.
//!
//! - `tiered`: bounded in-process cache classifying hits as fresh or stale
//! - `distributed`: JSON cache over a shared [`CacheBackend`] that never fails a request
//! - `backend`: Redis, in-process and null key/value backends
//! - `inflight`: singleflight registry so identical computations run once
//! - `negative`: short-lived record of market ids confirmed absent

pub mod backend;
pub mod distributed;
pub mod inflight;
pub mod negative;
pub mod tiered;

pub use backend::{
    connect_backend, BackendError, BackendResult, CacheBackend, MemoryBackend, NullBackend,
    RedisBackend,
};
pub use distributed::DistributedCache;
pub use inflight::{InflightRegistry, SharedResult};
pub use negative::NegativeCache;
pub use tiered::{CacheHit, Freshness, FreshnessCache};
