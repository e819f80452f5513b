use crate::config::TelemetryConfig;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::info;

/// Security-relevant events worth counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityEvent {
    RateLimited,
    Timeout,
    RetryFailed,
    InvalidInput,
    RpcProbeFailed,
    DegradedServed,
}

impl SecurityEvent {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::RetryFailed => "retry_failed",
            Self::InvalidInput => "invalid_input",
            Self::RpcProbeFailed => "rpc_probe_failed",
            Self::DegradedServed => "degraded_served",
        }
    }
}

/// Aggregated counts drained by [`SecurityTelemetry::flush`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub unique_keys: usize,
    pub total_count: u64,
    pub dropped: u64,
    /// Highest counts first, at most `top_keys` entries.
    pub samples: Vec<(String, u64)>,
}

#[derive(Default)]
struct Counters {
    counts: HashMap<String, u64>,
    dropped: u64,
}

/// Low-cardinality in-process counters for abuse and degradation signals.
///
/// Each event is keyed `event|route|kind|label` with clamped labels. A flush task drains
/// the counters periodically into one structured log line. Disabled instances drop events.
pub struct SecurityTelemetry {
    enabled: bool,
    max_keys: usize,
    top_keys: usize,
    flush_interval: Duration,
    counters: Mutex<Counters>,
}

/// Trims, truncates to `max_len` chars and replaces whitespace runs with `_`.
fn clamp_label(raw: &str, max_len: usize) -> String {
    let truncated: String = raw.trim().chars().take(max_len).collect();
    truncated.split_whitespace().collect::<Vec<_>>().join("_")
}

impl SecurityTelemetry {
    #[must_use]
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_keys: config.max_keys.max(1),
            top_keys: config.top_keys.max(1),
            flush_interval: Duration::from_secs(config.flush_interval_seconds.max(1)),
            counters: Mutex::new(Counters::default()),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::new(&TelemetryConfig { enabled: false, ..TelemetryConfig::default() })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&self, event: SecurityEvent, route: &str, kind: &str, label: &str) {
        if !self.enabled {
            return;
        }

        let key = format!(
            "{}|{}|{}|{}",
            clamp_label(event.as_str(), 48),
            clamp_label(route, 80),
            clamp_label(kind, 24),
            clamp_label(label, 80)
        );

        let mut counters = self.counters.lock();
        if let Some(count) = counters.counts.get_mut(&key) {
            *count += 1;
        } else if counters.counts.len() < self.max_keys {
            counters.counts.insert(key, 1);
        } else {
            counters.dropped += 1;
        }
    }

    /// Drains the counters. Returns `None` when nothing was recorded.
    pub fn flush(&self) -> Option<TelemetrySnapshot> {
        let Counters { counts, dropped } = std::mem::take(&mut *self.counters.lock());

        if counts.is_empty() && dropped == 0 {
            return None;
        }

        let mut samples: Vec<(String, u64)> = counts.into_iter().collect();
        samples.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let unique_keys = samples.len();
        let total_count: u64 = samples.iter().map(|(_, v)| v).sum();
        samples.truncate(self.top_keys);

        Some(TelemetrySnapshot { unique_keys, total_count, dropped, samples })
    }

    fn flush_and_log(&self) {
        if let Some(snapshot) = self.flush() {
            let samples = snapshot
                .samples
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",");

            info!(
                telemetry = "security",
                unique_keys = snapshot.unique_keys,
                total_count = snapshot.total_count,
                dropped = snapshot.dropped,
                samples = %samples,
                "security telemetry flush"
            );
        }
    }

    /// Spawns the periodic flush. Does nothing useful when disabled, but still honours
    /// shutdown. A final flush runs on shutdown.
    pub fn start_flush_task(
        self: &Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let telemetry = Arc::clone(self);
        let flush_interval = self.flush_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(flush_interval);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => telemetry.flush_and_log(),
                    _ = shutdown_rx.recv() => {
                        telemetry.flush_and_log();
                        break;
                    }
                }
            }
        })
    }
}
