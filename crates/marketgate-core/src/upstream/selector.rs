//! Endpoint health probing with ordered failover.
//!
//! # Selection Pass
//!
//! ```text
//! resolve()
//!    │
//!    ▼
//! cached selection for (environment, contract) still inside its window? ── yes ─► url
//!    │ no
//!    ▼
//! acquire probe lock ──► re-check cache (another task may have just probed)
//!    │
//!    ▼
//! for each candidate in priority order:
//!    ├── non-http scheme ─────────────────► skip
//!    ├── eth_blockNumber (deadline) ── bad ► skip
//!    ├── contract configured?
//!    │     └── eth_getCode(address) == 0x ─► skip
//!    └── healthy ─────────────────────────► cache + return
//!    │
//!    ▼
//! none healthy: fail-open → first candidate (cached), else none
//! ```
//!
//! URLs only ever reach logs through [`redact_url`].

use super::{candidates::is_http_url, http_client::HttpClient, UpstreamError};
use crate::{
    config::{is_contract_address, RpcConfig},
    metrics::{MetricsCollector, SecurityEvent, SecurityTelemetry},
    types::Environment,
    utils::{redact_url, Clock},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Minimum probe deadline regardless of configuration.
pub const MIN_PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// Produces the RPC endpoint to use for upstream reads.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// The endpoint to use, or `None` when nothing is configured (or, with fail-open
    /// disabled, nothing is healthy).
    async fn resolve(&self) -> Option<String>;

    /// All configured candidates in priority order.
    fn candidates(&self) -> &[String];

    /// Called after the resolved endpoint timed out or failed, so the next resolve can
    /// move to another candidate.
    fn invalidate(&self) {}
}

/// Why a probe accepted or rejected a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeReason {
    Ok,
    OkNoContract,
    UnsupportedScheme,
    BlockNumberFailed,
    InvalidContractAddress,
    ContractMissing,
}

impl ProbeReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::OkNoContract => "ok_no_contract",
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::BlockNumberFailed => "block_number_failed",
            Self::InvalidContractAddress => "invalid_contract_address",
            Self::ContractMissing => "contract_missing",
        }
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Ok | Self::OkNoContract)
    }
}

/// Result of probing one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub url: String,
    pub reason: ProbeReason,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
struct Selection {
    key: String,
    url: Option<String>,
    selected_at: Instant,
}

/// Probing resolver over an ordered candidate list.
pub struct EndpointSelector {
    http: Arc<HttpClient>,
    candidates: Vec<String>,
    contract_address: String,
    environment: Environment,
    probe_enabled: bool,
    probe_timeout: Duration,
    selection_ttl: Duration,
    fail_open: bool,
    selection: Mutex<Option<Selection>>,
    probe_lock: tokio::sync::Mutex<()>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<MetricsCollector>>,
    telemetry: Option<Arc<SecurityTelemetry>>,
}

impl EndpointSelector {
    #[must_use]
    pub fn new(
        config: &RpcConfig,
        environment: Environment,
        candidates: Vec<String>,
        http: Arc<HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            candidates,
            contract_address: config.contract_address.trim().to_string(),
            environment,
            probe_enabled: config.probe_enabled,
            probe_timeout: Duration::from_millis(config.probe_timeout_ms).max(MIN_PROBE_TIMEOUT),
            selection_ttl: Duration::from_millis(config.selection_cache_ms),
            fail_open: config.fail_open,
            selection: Mutex::new(None),
            probe_lock: tokio::sync::Mutex::new(()),
            clock,
            metrics: None,
            telemetry: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<SecurityTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    fn cache_key(&self) -> String {
        let env = if self.environment.is_strict() { "prod" } else { "dev" };
        format!("{env}|{}", self.contract_address.to_lowercase())
    }

    fn cached_selection(&self, key: &str) -> Option<Option<String>> {
        let now = self.clock.now();
        let selection = self.selection.lock();
        selection
            .as_ref()
            .filter(|s| {
                s.key == key && now.saturating_duration_since(s.selected_at) < self.selection_ttl
            })
            .map(|s| s.url.clone())
    }

    fn store_selection(&self, key: String, url: Option<String>) {
        *self.selection.lock() = Some(Selection { key, url, selected_at: self.clock.now() });
    }

    async fn rpc(
        &self,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, UpstreamError> {
        super::retry::with_timeout(
            self.probe_timeout,
            self.http.call(url, method, &params, self.probe_timeout),
        )
        .await
    }

    /// Runs the liveness and contract checks against one candidate.
    pub async fn probe(&self, url: &str) -> ProbeReport {
        let started = Instant::now();
        let reason = self.probe_reason(url).await;
        let report = ProbeReport { url: url.to_string(), reason, elapsed: started.elapsed() };

        if let Some(metrics) = &self.metrics {
            let elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX);
            metrics.record_probe(reason.as_str(), reason.is_healthy(), elapsed_ms);
        }

        report
    }

    async fn probe_reason(&self, url: &str) -> ProbeReason {
        if !is_http_url(url) {
            return ProbeReason::UnsupportedScheme;
        }

        let live = match self.rpc(url, "eth_blockNumber", json!([])).await {
            Ok(result) => result.as_str().is_some_and(|s| s.starts_with("0x")),
            Err(e) => {
                debug!(url = %redact_url(url), error = %e, "block number probe failed");
                false
            }
        };
        if !live {
            return ProbeReason::BlockNumberFailed;
        }

        if self.contract_address.is_empty() {
            return ProbeReason::OkNoContract;
        }
        if !is_contract_address(&self.contract_address) {
            return ProbeReason::InvalidContractAddress;
        }

        let code = self
            .rpc(url, "eth_getCode", json!([self.contract_address, "latest"]))
            .await
            .ok()
            .and_then(|v| v.as_str().map(str::to_lowercase))
            .unwrap_or_default();

        if code.is_empty() || code == "0x" {
            ProbeReason::ContractMissing
        } else {
            ProbeReason::Ok
        }
    }

    /// Probes every candidate in order without touching the cached selection.
    pub async fn probe_all(&self) -> Vec<ProbeReport> {
        let mut reports = Vec::with_capacity(self.candidates.len());
        for url in &self.candidates {
            reports.push(self.probe(url).await);
        }
        reports
    }

    async fn select(&self, key: String) -> Option<String> {
        for url in &self.candidates {
            let report = self.probe(url).await;
            let redacted = redact_url(url);

            if report.reason.is_healthy() {
                info!(
                    url = %redacted,
                    reason = report.reason.as_str(),
                    elapsed_ms = report.elapsed.as_millis(),
                    "rpc endpoint selected"
                );
                self.store_selection(key, Some(url.clone()));
                return Some(url.clone());
            }

            warn!(
                url = %redacted,
                reason = report.reason.as_str(),
                elapsed_ms = report.elapsed.as_millis(),
                "rpc endpoint probe failed, trying next"
            );
            if let Some(telemetry) = &self.telemetry {
                telemetry.record(SecurityEvent::RpcProbeFailed, "rpc", report.reason.as_str(), "");
            }
        }

        let fallback = if self.fail_open { self.candidates.first().cloned() } else { None };
        match &fallback {
            Some(url) => {
                warn!(
                    url = %redact_url(url),
                    "no healthy rpc endpoint, failing open to first candidate"
                );
            }
            None => warn!("no healthy rpc endpoint"),
        }

        self.store_selection(key, fallback.clone());
        fallback
    }
}

#[async_trait]
impl EndpointResolver for EndpointSelector {
    async fn resolve(&self) -> Option<String> {
        if self.candidates.is_empty() {
            return None;
        }
        if !self.probe_enabled {
            return self.candidates.first().cloned();
        }

        let key = self.cache_key();
        if let Some(url) = self.cached_selection(&key) {
            return url;
        }

        let _guard = self.probe_lock.lock().await;
        if let Some(url) = self.cached_selection(&key) {
            return url;
        }

        self.select(key).await
    }

    fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Forgets the cached selection so the next resolve probes again.
    fn invalidate(&self) {
        if self.selection.lock().take().is_some() {
            debug!("rpc endpoint selection invalidated");
        }
    }
}

/// Resolver that always answers with the same endpoint, without probing.
#[derive(Debug, Clone, Default)]
pub struct FixedEndpoint {
    candidates: Vec<String>,
}

impl FixedEndpoint {
    #[must_use]
    pub fn new(url: Option<String>) -> Self {
        Self { candidates: url.into_iter().collect() }
    }
}

#[async_trait]
impl EndpointResolver for FixedEndpoint {
    async fn resolve(&self) -> Option<String> {
        self.candidates.first().cloned()
    }

    fn candidates(&self) -> &[String] {
        &self.candidates
    }
}
