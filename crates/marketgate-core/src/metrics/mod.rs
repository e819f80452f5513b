//! # Metrics
//!
//! Prometheus counters and histograms recorded through the `metrics` facade. Every
//! recording is lock-free; the exporter handle renders the text exposition for `/metrics`.
//!
//! Label values are drawn from small closed sets (route names, cache tiers, JSON-RPC
//! method names, error kinds) so cardinality stays bounded. Client identities and URLs
//! never become labels.
//!
//! [`telemetry::SecurityTelemetry`] complements this with periodic structured log summaries
//! of abuse and degradation events.

pub mod telemetry;

pub use telemetry::{SecurityEvent, SecurityTelemetry};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn try_init_prometheus_recorder(
) -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().install_recorder()
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match try_init_prometheus_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Failed to install primary Prometheus recorder, attempting fallback"
                );

                let recorder = PrometheusBuilder::new().build_recorder();
                tracing::warn!(
                    "Using fallback Prometheus recorder (install error: {e}), \
                     metrics may not be globally visible"
                );
                recorder.handle()
            }
        })
        .clone()
}

pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    /// # Errors
    ///
    /// Returns an error if the Prometheus recorder cannot be initialized.
    pub fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self { prometheus_handle: init_prometheus_recorder() })
    }

    /// Record a served response
    #[allow(clippy::cast_precision_loss)]
    pub fn record_request(
        &self,
        route: &'static str,
        cache: &'static str,
        status: u16,
        latency_ms: u64,
    ) {
        counter!(
            "marketgate_requests_total",
            "route" => route,
            "cache" => cache,
            "status" => status.to_string()
        )
        .increment(1);
        histogram!("marketgate_request_duration_seconds", "route" => route)
            .record(latency_ms as f64 / 1000.0);
    }

    /// Record a cache tier lookup
    pub fn record_cache_lookup(&self, tier: &'static str, hit: bool) {
        if hit {
            counter!("marketgate_cache_hits_total", "tier" => tier).increment(1);
        } else {
            counter!("marketgate_cache_misses_total", "tier" => tier).increment(1);
        }
    }

    /// Record one upstream JSON-RPC call
    #[allow(clippy::cast_precision_loss)]
    pub fn record_upstream_call(&self, call: &'static str, success: bool, latency_ms: u64) {
        let outcome = if success { "success" } else { "error" };
        counter!("marketgate_upstream_calls_total", "call" => call, "outcome" => outcome)
            .increment(1);
        histogram!("marketgate_upstream_call_duration_seconds", "call" => call)
            .record(latency_ms as f64 / 1000.0);
    }

    /// Record an upstream failure by error kind
    pub fn record_upstream_error(&self, call: &'static str, kind: &'static str) {
        counter!("marketgate_upstream_errors_total", "call" => call, "kind" => kind).increment(1);
    }

    /// Record an endpoint probe result
    #[allow(clippy::cast_precision_loss)]
    pub fn record_probe(&self, reason: &'static str, healthy: bool, latency_ms: u64) {
        counter!("marketgate_rpc_probes_total", "reason" => reason).increment(1);
        histogram!("marketgate_rpc_probe_duration_seconds").record(latency_ms as f64 / 1000.0);
        gauge!("marketgate_rpc_last_probe_healthy").set(if healthy { 1.0 } else { 0.0 });
    }

    /// Record a rate limiter decision
    pub fn record_rate_limit(&self, scope: &'static str, allowed: bool) {
        if allowed {
            counter!("marketgate_rate_limit_allowed_total", "scope" => scope).increment(1);
        } else {
            counter!("marketgate_rate_limit_rejected_total", "scope" => scope).increment(1);
        }
    }

    /// Record a follower joining an in-flight computation
    pub fn record_inflight_join(&self, route: &'static str) {
        counter!("marketgate_inflight_joins_total", "route" => route).increment(1);
    }

    /// Record a negative cache hit
    pub fn record_negative_hit(&self) {
        counter!("marketgate_negative_cache_hits_total").increment(1);
    }

    /// Record a degraded response
    pub fn record_degraded(&self, route: &'static str, reason: &'static str) {
        counter!("marketgate_degraded_responses_total", "route" => route, "reason" => reason)
            .increment(1);
    }

    /// Record a security telemetry event
    pub fn record_security_event(&self, event: &'static str) {
        counter!("marketgate_security_events_total", "event" => event).increment(1);
    }

    /// Record in-process cache sizes
    #[allow(clippy::cast_precision_loss)]
    pub fn record_cache_entries(&self, cache_type: &'static str, entries: usize) {
        gauge!("marketgate_cache_entries", "cache_type" => cache_type).set(entries as f64);
    }

    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus_handle.render()
    }
}
