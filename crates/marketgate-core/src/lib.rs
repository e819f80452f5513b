//! # Marketgate Core
//!
//! Core library for the Marketgate read gateway, which answers prediction-market
//! queries (single market, paginated list, top markets) on top of a set of
//! unreliable JSON-RPC endpoints.
//!
//! This crate provides the foundational components for:
//!
//! - **[`cache`]**: Freshness-tiered in-process cache, negative cache, the distributed cache
//!   adapter over a pluggable [`cache::CacheBackend`], and the singleflight registry.
//!
//! - **[`upstream`]**: JSON-RPC transport, endpoint health probing with failover, contract read
//!   bindings, bounded batch fetching, and the timeout/retry decorators.
//!
//! - **[`middleware`]**: Client identity extraction, input validation, and the fixed-window rate
//!   limiter guarding the upstream path.
//!
//! - **[`gateway`]**: The [`gateway::MarketGateway`] service object and its three handlers.
//!
//! - **[`metrics`]**: Prometheus metrics and bounded security telemetry.
//!
//! - **[`config`]**: Layered configuration (defaults, TOML, environment).
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         MarketGateway                         │
//! │  ┌────────────────┐  ┌─────────────────┐  ┌────────────────┐  │
//! │  │ FreshnessCache │  │ EndpointResolver│  │  RateLimiter   │  │
//! │  │ NegativeCache  │  │  (probe + pick) │  │ (fixed window) │  │
//! │  └───────┬────────┘  └────────┬────────┘  └───────┬────────┘  │
//! │          │                    │                   │           │
//! │  ┌───────▼────────┐  ┌────────▼────────┐  ┌───────▼────────┐  │
//! │  │DistributedCache│  │  MarketReader   │  │  CacheBackend  │  │
//! │  │InflightRegistry│  │ (eth_call + ABI)│  │ redis | memory │  │
//! │  └────────────────┘  └─────────────────┘  └────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Request Flow
//!
//! ```text
//! Request
//!    │
//!    ▼
//! Validate ──── invalid ───► 400
//!    │
//!    ▼
//! Memory (fresh) ── hit ───► memory:fresh
//!    │
//!    ▼
//! Distributed ───── hit ───► redis (backfills memory)
//!    │
//!    ▼
//! In-flight? ───── joined ─► shared result / stale / fall through
//!    │
//!    ▼
//! Negative cache ── hit ───► 404
//!    │
//!    ▼
//! Rate limit ─── throttled ► stale (degraded) or 429
//!    │
//!    ▼
//! Resolve endpoint ─ none ─► 502 (strict) / placeholder (permissive)
//!    │
//!    ▼
//! Upstream reads (singleflight, timeout, retry, bounded fan-out)
//!    │
//!    ├── ok ──► populate memory + distributed ──► miss
//!    └── err ─► stale (degraded, fallback) or error
//! ```

pub mod cache;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod middleware;
pub mod types;
pub mod upstream;
pub mod utils;
