//! # Upstream
//!
//! Everything that talks to the chain: the JSON-RPC transport, candidate endpoint
//! ordering, health probing with failover, contract read bindings, bounded batch
//! fetching and the timeout/retry decorators.

pub mod batch;
pub mod candidates;
pub mod contract;
pub mod errors;
pub mod http_client;
pub mod retry;
pub mod selector;

pub use batch::{fetch_all, BatchOutcome, DEFAULT_BATCH_CONCURRENCY};
pub use candidates::{build_candidates, redacted_candidates};
pub use contract::{ContractReader, MarketAdmin, MarketBasics, MarketReader, MarketRecord};
pub use errors::{RpcErrorCategory, UpstreamError};
pub use http_client::{HttpClient, HttpClientConfig};
pub use retry::{with_retry, with_timeout};
pub use selector::{EndpointResolver, EndpointSelector, FixedEndpoint, ProbeReason, ProbeReport};
