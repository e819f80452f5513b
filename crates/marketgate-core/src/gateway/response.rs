use super::errors::GatewayError;
use crate::types::CacheStatus;
use serde_json::{json, Value};
use std::{fmt::Write as _, time::Duration};
use tokio::time::Instant;

pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

/// Pipeline phases reported in `Server-Timing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Cache,
    Redis,
    Inflight,
    RateLimit,
    Rpc,
}

impl Phase {
    const ALL: [Self; 5] = [Self::Cache, Self::Redis, Self::Inflight, Self::RateLimit, Self::Rpc];

    fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Redis => "redis",
            Self::Inflight => "inflight",
            Self::RateLimit => "ratelimit",
            Self::Rpc => "rpc",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Cache => 0,
            Self::Redis => 1,
            Self::Inflight => 2,
            Self::RateLimit => 3,
            Self::Rpc => 4,
        }
    }
}

/// Per-request phase stopwatch.
#[derive(Debug, Clone)]
pub struct ServerTiming {
    started: Instant,
    phases: [Option<Duration>; 5],
}

impl Default for ServerTiming {
    fn default() -> Self {
        Self::start()
    }
}

impl ServerTiming {
    #[must_use]
    pub fn start() -> Self {
        Self { started: Instant::now(), phases: [None; 5] }
    }

    /// Adds the time elapsed since `since` to `phase`.
    pub fn record(&mut self, phase: Phase, since: Instant) {
        let slot = &mut self.phases[phase.index()];
        *slot = Some(slot.unwrap_or_default() + since.elapsed());
    }

    #[must_use]
    pub fn total(&self) -> Duration {
        self.started.elapsed()
    }

    /// Renders `cache;dur=0.1, ..., total;dur=12.3` for the phases that ran.
    #[must_use]
    pub fn header_value(&self) -> String {
        let mut out = String::new();
        for phase in Phase::ALL {
            if let Some(duration) = self.phases[phase.index()] {
                let _ = write!(out, "{};dur={:.1}, ", phase.as_str(), millis(duration));
            }
        }
        let _ = write!(out, "total;dur={:.1}", millis(self.total()));
        out
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Framework-agnostic response: status, JSON body and headers.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: Value,
    pub headers: Vec<(&'static str, String)>,
    pub cache_status: CacheStatus,
}

impl GatewayResponse {
    /// 200 with `Cache-Control: public, max-age=<max_age>`.
    #[must_use]
    pub fn ok(body: Value, cache_status: CacheStatus, max_age: Duration) -> Self {
        let mut response = Self::bare(200, body, cache_status);
        response.push_header("Cache-Control", format!("public, max-age={}", max_age.as_secs()));
        response
    }

    /// Stale or placeholder answer. Object bodies gain `"degraded": true`.
    #[must_use]
    pub fn degraded(mut body: Value, cache_status: CacheStatus, max_age: Duration) -> Self {
        if let Some(object) = body.as_object_mut() {
            object.insert("degraded".to_string(), Value::Bool(true));
        }
        Self::ok(body, cache_status, max_age)
    }

    /// Permissive placeholder, served without the degraded marker.
    #[must_use]
    pub fn placeholder(body: Value, max_age: Duration) -> Self {
        Self::ok(body, CacheStatus::Fallback, max_age)
    }

    /// Error body `{error}` plus a redacted `detail` when `include_detail` is set.
    #[must_use]
    pub fn error(error: &GatewayError, include_detail: bool, cache_status: CacheStatus) -> Self {
        let mut body = json!({ "error": error.public_message() });
        if include_detail {
            if let Some(detail) = error.detail() {
                body["detail"] = Value::String(detail);
            }
        }

        let mut response = Self::bare(error.status_code(), body, cache_status);
        if let GatewayError::RateLimited { retry_after_secs } = error {
            response.push_header("Retry-After", retry_after_secs.to_string());
        }
        response
    }

    /// 404 for a permissive deployment without any RPC endpoint.
    #[must_use]
    pub fn not_configured_placeholder(max_age: Duration) -> Self {
        let mut response =
            Self::bare(404, json!({ "error": "RPC not configured" }), CacheStatus::Fallback);
        response.push_header("Cache-Control", format!("public, max-age={}", max_age.as_secs()));
        response
    }

    fn bare(status: u16, body: Value, cache_status: CacheStatus) -> Self {
        let mut response = Self { status, body, headers: Vec::with_capacity(5), cache_status };
        response.push_header("Content-Type", CONTENT_TYPE_JSON.to_string());
        response.push_header("X-Cache", cache_status.as_str().to_string());
        response
    }

    fn push_header(&mut self, name: &'static str, value: String) {
        self.headers.push((name, value));
    }

    /// Stamps the `Server-Timing` header. Called once, as the response leaves the gateway.
    #[must_use]
    pub fn with_timing(mut self, timing: &ServerTiming) -> Self {
        self.headers.retain(|(name, _)| *name != "Server-Timing");
        self.push_header("Server-Timing", timing.header_value());
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.body.get("degraded").and_then(Value::as_bool).unwrap_or(false)
    }
}
