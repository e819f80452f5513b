//! # Gateway
//!
//! The [`MarketGateway`] service object and its three query handlers.
//!
//! Every handler runs the same decision order. The first step that produces an
//! answer wins:
//!
//! | Step | Check | Answer |
//! |------|-------|--------|
//! | 1 | Input validation | `400 {error}` |
//! | 2 | In-process cache, fresh | `X-Cache: memory:fresh` |
//! | 3 | Distributed cache | `X-Cache: redis`, backfills step 2 |
//! | 4 | In-flight computation for the key | shared result, or stale on wait expiry |
//! | 5 | Negative cache (single market only) | `404 {error: "Market not found"}` |
//! | 6 | Rate limit for `(route, client)` | stale (degraded) or `429` + `Retry-After` |
//! | 7 | Endpoint resolution | strict `502`, permissive placeholder |
//! | 8 | Upstream reads inside the singleflight registration | `X-Cache: miss` |
//! | 9 | Populate both tiers | `Cache-Control: public, max-age=<ttl>` |
//! | 10 | Any failure from step 6 on | stale entry with `degraded: true`, else the error |
//!
//! Handlers return a framework-agnostic [`GatewayResponse`]; the server crate maps it
//! onto HTTP.

pub mod engine;
pub mod errors;
pub mod handlers;
pub mod response;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{GatewayBuilder, MarketGateway, SharedContext};
pub use errors::GatewayError;
pub use response::{GatewayResponse, ServerTiming, CONTENT_TYPE_JSON};
