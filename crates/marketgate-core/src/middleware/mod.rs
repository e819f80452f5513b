//! Request gatekeeping ahead of the expensive upstream path.
//!
//! This module holds the framework-agnostic business logic. HTTP adapters (axum extractors,
//! header maps) live in `crates/server`.
//!
//! ```text
//!   Incoming Request
//!        │
//!        ▼
//!   ┌─────────────────────────┐
//!   │  1. VALIDATION          │  parse_market_id / parse_page_query
//!   └─────────────────────────┘
//!        │ ValidationError?
//!        ├─> 400 {error}
//!        ▼
//!   (cache tiers, in-flight join, negative cache)
//!        │
//!        ▼
//!   ┌─────────────────────────┐
//!   │  2. CLIENT IDENTITY     │  extract_client_ip
//!   └─────────────────────────┘
//!        │
//!        ▼
//!   ┌─────────────────────────┐
//!   │  3. RATE LIMITING       │  RateLimiter::check (fixed window)
//!   └─────────────────────────┘
//!        │ Throttled?
//!        ├─> stale value (degraded) or 429 + Retry-After
//!        ▼
//!   Upstream reads
//! ```
//!
//! The rate limiter only runs on requests that would otherwise reach upstream; cache hits
//! are never counted.

pub mod client_ip;
pub mod rate_limiting;
pub mod validation;

pub use client_ip::extract_client_ip;
pub use rate_limiting::{RateLimitDecision, RateLimiter};
pub use validation::{parse_market_id, parse_page_query, PageQuery, ValidationError};
