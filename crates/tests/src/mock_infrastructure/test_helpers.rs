//! Test Helper Functions and Utilities
//!
//! Gateways and readers wired to a mock endpoint with a manual clock.

use marketgate_core::{
    cache::{CacheBackend, MemoryBackend},
    config::AppConfig,
    gateway::MarketGateway,
    metrics::MetricsCollector,
    types::Environment,
    upstream::{ContractReader, FixedEndpoint, HttpClient},
    utils::{Clock, ManualClock},
};
use std::{sync::Arc, time::Duration};

/// A deployed-looking contract address.
pub const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

/// Test environment, rate limiting off, single-attempt reads with short deadlines.
#[must_use]
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.environment = Environment::Test;
    config.rate_limit.enabled = false;
    config.rpc.contract_address = CONTRACT.to_string();
    config.rpc.retry_attempts = 1;
    config.rpc.retry_delay_ms = 10;
    config.rpc.call_timeout_ms = 2_000;
    config.rpc.probe_timeout_ms = 500;
    config
}

/// # Panics
///
/// Panics if the HTTP client cannot be built.
#[must_use]
pub fn contract_reader(config: &AppConfig) -> ContractReader {
    ContractReader::new(
        Arc::new(HttpClient::new().expect("http client")),
        config.rpc.contract_address.clone(),
        Duration::from_millis(config.rpc.call_timeout_ms),
        config.rpc.retry_attempts,
        Duration::from_millis(config.rpc.retry_delay_ms),
    )
}

/// A gateway reading from `rpc_url` through the real contract reader.
pub struct MockGateway {
    pub gateway: MarketGateway,
    pub clock: Arc<ManualClock>,
}

impl MockGateway {
    /// # Panics
    ///
    /// Panics if the gateway cannot be built.
    #[must_use]
    pub fn new(rpc_url: &str, config: AppConfig) -> Self {
        let clock = ManualClock::new();
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new(Arc::clone(&dyn_clock)));
        let reader = Arc::new(contract_reader(&config));

        let gateway = MarketGateway::builder(config)
            .clock(dyn_clock)
            .backend(backend)
            .resolver(Arc::new(FixedEndpoint::new(Some(rpc_url.to_string()))))
            .reader(reader)
            .metrics(Arc::new(MetricsCollector::new().expect("metrics")))
            .build()
            .expect("gateway");

        Self { gateway, clock }
    }
}
