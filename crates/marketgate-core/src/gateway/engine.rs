use std::{future::Future, sync::Arc, time::Duration};

use serde_json::{json, Value};
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    cache::{
        connect_backend, CacheBackend, DistributedCache, FreshnessCache, InflightRegistry,
        NegativeCache,
    },
    config::AppConfig,
    metrics::{MetricsCollector, SecurityEvent, SecurityTelemetry},
    middleware::{RateLimitDecision, RateLimiter, ValidationError},
    types::CacheStatus,
    upstream::{
        build_candidates, ContractReader, EndpointResolver, EndpointSelector, HttpClient,
        HttpClientConfig, MarketReader,
    },
    utils::{redact_url, Clock, SystemClock},
};

use super::{
    errors::GatewayError,
    handlers::{MarketHandler, MarketsHandler, TopMarketsHandler},
    response::{GatewayResponse, Phase, ServerTiming},
};

const MARKET_COUNT_KEY: &str = "marketCount";
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// What to do when no RPC endpoint is configured in a permissive environment.
#[derive(Debug, Clone)]
pub(crate) enum Placeholder {
    /// `404 {error: "RPC not configured"}`.
    NotFound,
    /// `200` with this body.
    Body(Value),
}

/// Per-request description of one cacheable query.
#[derive(Debug, Clone)]
pub(crate) struct RouteSpec {
    /// Route label for metrics, rate limit scope and telemetry.
    pub route: &'static str,
    pub key: String,
    pub ttl: Duration,
    /// Entity id checked against the negative cache, for single-entity routes.
    pub negative_id: Option<u64>,
    pub placeholder: Placeholder,
}

/// Shared state for all handlers.
///
/// Every map is internally synchronized; no lock is held across an await.
pub struct SharedContext {
    pub config: Arc<AppConfig>,
    pub clock: Arc<dyn Clock>,
    pub memory: FreshnessCache<Value>,
    pub counts: FreshnessCache<u64>,
    pub distributed: DistributedCache,
    pub negative: NegativeCache,
    pub inflight: InflightRegistry<Result<Value, GatewayError>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub resolver: Arc<dyn EndpointResolver>,
    pub reader: Arc<dyn MarketReader>,
    pub metrics: Arc<MetricsCollector>,
    pub telemetry: Arc<SecurityTelemetry>,
}

fn elapsed_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl SharedContext {
    fn secs(seconds: u64) -> Duration {
        Duration::from_secs(seconds)
    }

    pub(crate) fn negative_ttl(&self) -> Duration {
        Self::secs(self.config.cache.negative_ttl_seconds)
    }

    fn inflight_wait(&self) -> Duration {
        Duration::from_millis(self.config.cache.inflight_wait_ms)
    }

    fn placeholder_max_age(&self) -> Duration {
        Self::secs(self.config.cache.placeholder_max_age_seconds)
    }

    fn include_detail(&self) -> bool {
        !self.config.environment.is_strict()
    }

    /// Records a security event in telemetry and mirrors it to the metrics counter.
    pub(crate) fn security_event(
        &self,
        event: SecurityEvent,
        route: &str,
        kind: &str,
        label: &str,
    ) {
        self.telemetry.record(event, route, kind, label);
        self.metrics.record_security_event(event.as_str());
    }

    /// `marketCount()` through its own short-lived cache.
    pub(crate) async fn market_count(&self, endpoint: &str) -> Result<u64, GatewayError> {
        if let Some(hit) = self.counts.get(MARKET_COUNT_KEY, false) {
            return Ok(hit.value);
        }

        let count = self.reader.market_count(endpoint).await?;
        self.counts.set(MARKET_COUNT_KEY, count, Self::secs(self.config.cache.count_ttl_seconds));
        Ok(count)
    }

    /// Answers a rejected input without touching any cache or upstream.
    pub(crate) fn reject(&self, route: &'static str, error: ValidationError) -> GatewayResponse {
        let timing = ServerTiming::start();
        self.security_event(SecurityEvent::InvalidInput, route, "validation", &error.to_string());
        let response =
            GatewayResponse::error(&GatewayError::from(error), false, CacheStatus::Miss);
        self.finish(route, response, &timing)
    }

    fn finish(
        &self,
        route: &'static str,
        response: GatewayResponse,
        timing: &ServerTiming,
    ) -> GatewayResponse {
        self.metrics.record_request(
            route,
            response.cache_status.as_str(),
            response.status,
            elapsed_ms(timing.total()),
        );
        response.with_timing(timing)
    }

    /// Runs the cache, coalescing, rate limit and upstream pipeline for one query.
    ///
    /// `compute` receives the resolved endpoint and runs on a detached task inside the
    /// singleflight registration. Its successful result populates both cache tiers.
    pub(crate) async fn serve<F, Fut>(
        self: &Arc<Self>,
        spec: RouteSpec,
        client: &str,
        compute: F,
    ) -> GatewayResponse
    where
        F: FnOnce(Arc<Self>, String) -> Fut,
        Fut: Future<Output = Result<Value, GatewayError>> + Send + 'static,
    {
        let mut timing = ServerTiming::start();
        let response = self.pipeline(&spec, client, compute, &mut timing).await;
        self.finish(spec.route, response, &timing)
    }

    async fn pipeline<F, Fut>(
        self: &Arc<Self>,
        spec: &RouteSpec,
        client: &str,
        compute: F,
        timing: &mut ServerTiming,
    ) -> GatewayResponse
    where
        F: FnOnce(Arc<Self>, String) -> Fut,
        Fut: Future<Output = Result<Value, GatewayError>> + Send + 'static,
    {
        let since = Instant::now();
        let fresh = self.memory.get(&spec.key, false);
        timing.record(Phase::Cache, since);
        self.metrics.record_cache_lookup("memory", fresh.is_some());
        if let Some(hit) = fresh {
            return GatewayResponse::ok(hit.value, CacheStatus::MemoryFresh, spec.ttl);
        }

        let since = Instant::now();
        let remote = self.distributed.get::<Value>(&spec.key).await;
        timing.record(Phase::Redis, since);
        self.metrics.record_cache_lookup("distributed", remote.is_some());
        if let Some(value) = remote {
            self.memory.set(spec.key.clone(), value.clone(), spec.ttl);
            return GatewayResponse::ok(value, CacheStatus::Redis, spec.ttl);
        }

        if let Some(pending) = self.inflight.join(&spec.key) {
            self.metrics.record_inflight_join(spec.route);
            let since = Instant::now();
            let joined = tokio::time::timeout(self.inflight_wait(), pending).await;
            timing.record(Phase::Inflight, since);

            match joined {
                Ok(Some(Ok(value))) => {
                    return GatewayResponse::ok(value, CacheStatus::Miss, spec.ttl);
                }
                Ok(Some(Err(error))) => return self.fail(spec, error),
                Ok(None) => debug!(key = %spec.key, "joined computation aborted, recomputing"),
                Err(_) => {
                    let stale = self.stale(spec, CacheStatus::MemoryStale, "inflight_wait");
                    if let Some(stale) = stale {
                        return stale;
                    }
                    debug!(key = %spec.key, "in-flight wait expired without a stale entry");
                    return self.fail(spec, GatewayError::UpstreamTimeout);
                }
            }
        }

        if let Some(id) = spec.negative_id {
            if self.negative.is_absent(id) {
                self.metrics.record_negative_hit();
                return GatewayResponse::error(&GatewayError::NotFound, false, CacheStatus::Miss);
            }
        }

        let limit = self.config.rate_limit.limit_for(spec.route);
        let since = Instant::now();
        let decision =
            self.rate_limiter.check(spec.route, client, limit.requests, limit.window_seconds).await;
        timing.record(Phase::RateLimit, since);
        self.metrics.record_rate_limit(spec.route, decision.is_allowed());
        if let RateLimitDecision::Throttled { retry_after_secs } = decision {
            self.security_event(SecurityEvent::RateLimited, spec.route, "client", client);
            return self.fail(spec, GatewayError::RateLimited { retry_after_secs });
        }

        let since = Instant::now();
        let Some(endpoint) = self.resolver.resolve().await else {
            timing.record(Phase::Rpc, since);
            return self.not_configured(spec);
        };

        let ctx = Arc::clone(self);
        let work = compute(Arc::clone(self), endpoint);
        let key = spec.key.clone();
        let ttl = spec.ttl;
        let populate = async move {
            let result = work.await;
            if let Ok(value) = &result {
                ctx.memory.set(key.clone(), value.clone(), ttl);
                ctx.distributed.set(&key, value, ttl).await;
            }
            result
        };

        let result = self
            .inflight
            .run_exclusive(&spec.key, populate)
            .await
            .unwrap_or_else(|| Err(GatewayError::Internal("upstream computation aborted".into())));
        timing.record(Phase::Rpc, since);

        match result {
            Ok(value) => GatewayResponse::ok(value, CacheStatus::Miss, spec.ttl),
            Err(error) => {
                if matches!(
                    error,
                    GatewayError::UpstreamTimeout | GatewayError::UpstreamUnavailable(_)
                ) {
                    self.resolver.invalidate();
                }
                self.fail(spec, error)
            }
        }
    }

    /// The freshest in-process entry for the key, even stale, served as degraded.
    fn stale(
        &self,
        spec: &RouteSpec,
        status: CacheStatus,
        reason: &'static str,
    ) -> Option<GatewayResponse> {
        let hit = self.memory.get(&spec.key, true)?;

        self.metrics.record_degraded(spec.route, reason);
        self.security_event(SecurityEvent::DegradedServed, spec.route, reason, "");
        debug!(
            key = %spec.key,
            reason,
            age_ms = hit.age.as_millis(),
            "serving degraded cache entry"
        );

        Some(GatewayResponse::degraded(hit.value, status, self.placeholder_max_age()))
    }

    /// Prefers stale data over any non-definitive failure.
    fn fail(&self, spec: &RouteSpec, error: GatewayError) -> GatewayResponse {
        match &error {
            GatewayError::UpstreamTimeout => {
                self.security_event(SecurityEvent::Timeout, spec.route, "rpc", "");
            }
            GatewayError::UpstreamUnavailable(_) => {
                self.security_event(SecurityEvent::RetryFailed, spec.route, "rpc", "");
            }
            _ => {}
        }

        if !error.is_definitive() {
            if let Some(stale) = self.stale(spec, CacheStatus::Fallback, error.kind()) {
                return stale;
            }
        }

        if error.status_code() >= 500 {
            warn!(route = spec.route, error = %error, "request failed");
        }
        GatewayResponse::error(&error, self.include_detail(), CacheStatus::Miss)
    }

    fn not_configured(&self, spec: &RouteSpec) -> GatewayResponse {
        if self.config.environment.is_strict() {
            return self.fail(spec, GatewayError::Configuration("RPC not configured".to_string()));
        }

        debug!(route = spec.route, "no rpc endpoint configured, serving placeholder");
        self.metrics.record_degraded(spec.route, "not_configured");
        match &spec.placeholder {
            Placeholder::NotFound => {
                GatewayResponse::not_configured_placeholder(self.placeholder_max_age())
            }
            Placeholder::Body(body) => {
                GatewayResponse::placeholder(body.clone(), self.placeholder_max_age())
            }
        }
    }

    fn record_cache_sizes(&self) {
        self.metrics.record_cache_entries("memory", self.memory.len());
        self.metrics.record_cache_entries("negative", self.negative.len());
        self.metrics.record_cache_entries("inflight", self.inflight.len());
        self.metrics.record_cache_entries("rate_limit_windows", self.rate_limiter.window_count());
    }
}

/// The gateway service: owns the shared context and the three query handlers.
pub struct MarketGateway {
    ctx: Arc<SharedContext>,
    market_handler: MarketHandler,
    markets_handler: MarketsHandler,
    top_markets_handler: TopMarketsHandler,
}

impl MarketGateway {
    /// Builds a gateway from configuration, connecting the distributed cache backend.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] if the HTTP client cannot be built.
    pub async fn from_config(
        config: AppConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, GatewayError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let backend = connect_backend(&config.redis, Arc::clone(&clock)).await;

        GatewayBuilder::new(config).clock(clock).backend(backend).metrics(metrics).build()
    }

    #[must_use]
    pub fn builder(config: AppConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    fn from_context(ctx: Arc<SharedContext>) -> Self {
        Self {
            market_handler: MarketHandler::new(Arc::clone(&ctx)),
            markets_handler: MarketsHandler::new(Arc::clone(&ctx)),
            top_markets_handler: TopMarketsHandler::new(Arc::clone(&ctx)),
            ctx,
        }
    }

    /// `GET /api/market/{id}`
    pub async fn market(&self, raw_id: &str, client: &str) -> GatewayResponse {
        self.market_handler.handle(raw_id, client).await
    }

    /// `GET /api/markets?page=&limit=`
    pub async fn markets(
        &self,
        page: Option<&str>,
        limit: Option<&str>,
        client: &str,
    ) -> GatewayResponse {
        self.markets_handler.handle(page, limit, client).await
    }

    /// `GET /api/top-markets`
    pub async fn top_markets(&self, client: &str) -> GatewayResponse {
        self.top_markets_handler.handle(client).await
    }

    /// `GET /api/cache-status`: which backend is selected and whether it answers.
    pub async fn cache_status(&self) -> GatewayResponse {
        let redis_available = self.ctx.distributed.is_distributed();
        let probe_ok = redis_available && self.ctx.distributed.probe().await;

        GatewayResponse::ok(
            json!({ "redisAvailable": redis_available, "probeOk": probe_ok }),
            CacheStatus::Miss,
            Duration::ZERO,
        )
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.ctx.config
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.ctx.metrics
    }

    #[must_use]
    pub fn rpc_candidates(&self) -> &[String] {
        self.ctx.resolver.candidates()
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.ctx.distributed.backend().name()
    }

    #[must_use]
    pub fn context(&self) -> &Arc<SharedContext> {
        &self.ctx
    }

    /// Spawns the rate limiter sweeper, the telemetry flush and cache maintenance.
    pub fn start_background_tasks(&self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let mut handles = vec![
            self.ctx.rate_limiter.start_cleanup_task(shutdown.subscribe()),
            self.ctx.telemetry.start_flush_task(shutdown.subscribe()),
        ];

        let ctx = Arc::clone(&self.ctx);
        let mut shutdown_rx = shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let pruned = ctx.memory.prune_expired();
                        if pruned > 0 {
                            debug!(pruned, "pruned expired cache entries");
                        }
                        ctx.record_cache_sizes();
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        }));

        handles
    }
}

/// Assembles a [`MarketGateway`], defaulting every component from configuration.
///
/// Tests inject clocks, backends, resolvers and readers here.
pub struct GatewayBuilder {
    config: AppConfig,
    clock: Option<Arc<dyn Clock>>,
    backend: Option<Arc<dyn CacheBackend>>,
    resolver: Option<Arc<dyn EndpointResolver>>,
    reader: Option<Arc<dyn MarketReader>>,
    metrics: Option<Arc<MetricsCollector>>,
    telemetry: Option<Arc<SecurityTelemetry>>,
}

impl GatewayBuilder {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            clock: None,
            backend: None,
            resolver: None,
            reader: None,
            metrics: None,
            telemetry: None,
        }
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn EndpointResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn reader(mut self, reader: Arc<dyn MarketReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn telemetry(mut self, telemetry: Arc<SecurityTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] if the metrics recorder or the HTTP client
    /// cannot be built.
    pub fn build(self) -> Result<MarketGateway, GatewayError> {
        let config = Arc::new(self.config);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let backend = self.backend.unwrap_or_else(|| Arc::new(crate::cache::NullBackend));

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(
                MetricsCollector::new().map_err(|e| GatewayError::Configuration(e.to_string()))?,
            ),
        };
        let telemetry =
            self.telemetry.unwrap_or_else(|| Arc::new(SecurityTelemetry::new(&config.telemetry)));

        let needs_http = self.resolver.is_none() || self.reader.is_none();
        let http = if needs_http {
            let http_config = HttpClientConfig {
                concurrent_limit: config.rpc.max_concurrent_calls,
                ..HttpClientConfig::default()
            };
            Some(Arc::new(
                HttpClient::with_config(http_config)
                    .map_err(|e| GatewayError::Configuration(e.to_string()))?,
            ))
        } else {
            None
        };

        let resolver: Arc<dyn EndpointResolver> = match (self.resolver, &http) {
            (Some(resolver), _) => resolver,
            (None, Some(http)) => {
                let candidates = build_candidates(&config.rpc, config.environment);
                let redacted: Vec<String> = candidates.iter().map(|c| redact_url(c)).collect();
                info!(
                    candidates = ?redacted,
                    environment = config.environment.as_str(),
                    "rpc candidates configured"
                );
                Arc::new(
                    EndpointSelector::new(
                        &config.rpc,
                        config.environment,
                        candidates,
                        Arc::clone(http),
                        Arc::clone(&clock),
                    )
                    .with_metrics(Arc::clone(&metrics))
                    .with_telemetry(Arc::clone(&telemetry)),
                )
            }
            (None, None) => return Err(GatewayError::Internal("http client missing".into())),
        };

        let reader: Arc<dyn MarketReader> = match (self.reader, &http) {
            (Some(reader), _) => reader,
            (None, Some(http)) => Arc::new(
                ContractReader::new(
                    Arc::clone(http),
                    config.rpc.contract_address.trim(),
                    Duration::from_millis(config.rpc.call_timeout_ms),
                    config.rpc.retry_attempts,
                    Duration::from_millis(config.rpc.retry_delay_ms),
                )
                .with_metrics(Arc::clone(&metrics)),
            ),
            (None, None) => return Err(GatewayError::Internal("http client missing".into())),
        };

        let stale_ttl = Duration::from_secs(config.cache.stale_ttl_seconds);
        let ctx = Arc::new(SharedContext {
            memory: FreshnessCache::new(config.cache.max_entries, stale_ttl, Arc::clone(&clock)),
            counts: FreshnessCache::new(16, stale_ttl, Arc::clone(&clock)),
            distributed: DistributedCache::new(
                Arc::clone(&backend),
                config.redis.key_prefix.clone(),
                config.cache.max_payload_bytes,
            ),
            negative: NegativeCache::new(config.cache.negative_max_entries, Arc::clone(&clock)),
            inflight: InflightRegistry::new(config.cache.inflight_max_entries),
            rate_limiter: Arc::new(RateLimiter::new(
                &config.rate_limit,
                Arc::clone(&backend),
                config.redis.key_prefix.clone(),
                Arc::clone(&clock),
            )),
            resolver,
            reader,
            metrics,
            telemetry,
            clock,
            config,
        });

        info!(
            backend = ctx.distributed.backend().name(),
            rate_limit_enabled = ctx.rate_limiter.is_enabled(),
            "market gateway initialized"
        );

        Ok(MarketGateway::from_context(ctx))
    }
}
