//! In-process fakes for handler tests.

use super::MarketGateway;
use crate::{
    cache::{CacheBackend, MemoryBackend},
    config::AppConfig,
    metrics::MetricsCollector,
    types::Environment,
    upstream::{
        EndpointResolver, FixedEndpoint, MarketAdmin, MarketBasics, MarketReader, MarketRecord,
        UpstreamError,
    },
    utils::{Clock, ManualClock},
};
use alloy_primitives::U256;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

pub(crate) fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.environment = Environment::Test;
    config.rate_limit.enabled = false;
    config
}

/// Reader over `count` synthetic markets: market `i` has `yesPool = 100 * i`,
/// `noPool = 10 * i`, status `0`.
pub(crate) struct FakeReader {
    count: Mutex<u64>,
    records: Mutex<HashMap<u64, MarketRecord>>,
    market_errors: Mutex<HashMap<u64, String>>,
    revert_ids: Mutex<HashMap<u64, String>>,
    down: AtomicBool,
    basics_fail: AtomicBool,
    delay: Duration,
    count_calls: AtomicUsize,
    market_calls: AtomicUsize,
    other_calls: AtomicUsize,
}

impl FakeReader {
    pub(crate) fn with_markets(count: u64) -> Self {
        let records = (0..count)
            .map(|i| {
                (
                    i,
                    MarketRecord {
                        question: format!("Question {i}?"),
                        yes_pool: U256::from(100 * i),
                        no_pool: U256::from(10 * i),
                        status: 0,
                        outcome: false,
                        close_time: U256::from(1_700_000_000u64 + i),
                    },
                )
            })
            .collect();

        Self {
            count: Mutex::new(count),
            records: Mutex::new(records),
            market_errors: Mutex::new(HashMap::new()),
            revert_ids: Mutex::new(HashMap::new()),
            down: AtomicBool::new(false),
            basics_fail: AtomicBool::new(false),
            delay: Duration::ZERO,
            count_calls: AtomicUsize::new(0),
            market_calls: AtomicUsize::new(0),
            other_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn set_record(&self, id: u64, record: MarketRecord) {
        self.records.lock().insert(id, record);
    }

    /// Makes `getMarket(id)` fail with `error`. Only reverts and HTTP errors are kept.
    pub(crate) fn fail_market(&self, id: u64, error: UpstreamError) {
        match error {
            UpstreamError::RpcError(_, message) => {
                self.revert_ids.lock().insert(id, message);
            }
            other => {
                self.market_errors.lock().insert(id, other.to_string());
            }
        }
    }

    pub(crate) fn fail_basics(&self, fail: bool) {
        self.basics_fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub(crate) fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn market_calls(&self) -> usize {
        self.market_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.count_calls() + self.market_calls() + self.other_calls.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<(), UpstreamError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(UpstreamError::HttpError(503, "service unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketReader for FakeReader {
    async fn market_count(&self, _endpoint: &str) -> Result<u64, UpstreamError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        Ok(*self.count.lock())
    }

    async fn market(&self, _endpoint: &str, id: u64) -> Result<MarketRecord, UpstreamError> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;

        if let Some(message) = self.revert_ids.lock().get(&id) {
            return Err(UpstreamError::RpcError(3, message.clone()));
        }
        if let Some(message) = self.market_errors.lock().get(&id) {
            return Err(UpstreamError::ConnectionFailed(message.clone()));
        }
        self.records
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| UpstreamError::RpcError(3, "execution reverted: not found".into()))
    }

    async fn market_basics(&self, _endpoint: &str, id: u64) -> Result<MarketBasics, UpstreamError> {
        self.other_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        if self.basics_fail.load(Ordering::SeqCst) {
            return Err(UpstreamError::Timeout);
        }
        Ok(MarketBasics {
            question: format!("Question {id}?"),
            description: format!("Description {id}"),
            category: format!("cat-{id}"),
        })
    }

    async fn market_admin(&self, _endpoint: &str, _id: u64) -> Result<MarketAdmin, UpstreamError> {
        self.other_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        Ok(MarketAdmin { paused: false, dispute_used: false, dispute_active: false })
    }
}

/// Fixed resolver that counts how often its selection was invalidated.
pub(crate) struct RecordingResolver {
    inner: FixedEndpoint,
    invalidations: AtomicUsize,
}

impl RecordingResolver {
    pub(crate) fn new(url: &str) -> Self {
        Self {
            inner: FixedEndpoint::new(Some(url.to_string())),
            invalidations: AtomicUsize::new(0),
        }
    }

    pub(crate) fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EndpointResolver for RecordingResolver {
    async fn resolve(&self) -> Option<String> {
        self.inner.resolve().await
    }

    fn candidates(&self) -> &[String] {
        self.inner.candidates()
    }

    fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

/// A gateway wired to a [`FakeReader`], a manual clock and an in-memory backend.
pub(crate) struct TestGateway {
    pub gateway: MarketGateway,
    pub clock: Arc<ManualClock>,
    pub backend: Arc<MemoryBackend>,
}

impl TestGateway {
    pub(crate) fn new(config: AppConfig, reader: Arc<FakeReader>) -> Self {
        let resolver = FixedEndpoint::new(Some("http://rpc.test".to_string()));
        Self::build(config, reader, Arc::new(resolver))
    }

    pub(crate) fn with_resolver(
        config: AppConfig,
        reader: Arc<FakeReader>,
        resolver: Arc<dyn EndpointResolver>,
    ) -> Self {
        Self::build(config, reader, resolver)
    }

    pub(crate) fn without_endpoint(config: AppConfig, reader: Arc<FakeReader>) -> Self {
        Self::build(config, reader, Arc::new(FixedEndpoint::new(None)))
    }

    fn build(
        config: AppConfig,
        reader: Arc<FakeReader>,
        resolver: Arc<dyn EndpointResolver>,
    ) -> Self {
        let clock = ManualClock::new();
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let backend = Arc::new(MemoryBackend::new(Arc::clone(&dyn_clock)));
        let dyn_backend: Arc<dyn CacheBackend> = backend.clone();

        let gateway = MarketGateway::builder(config)
            .clock(dyn_clock)
            .backend(dyn_backend)
            .resolver(resolver)
            .reader(reader)
            .metrics(Arc::new(MetricsCollector::new().unwrap()))
            .build()
            .unwrap();

        Self { gateway, clock, backend }
    }
}
