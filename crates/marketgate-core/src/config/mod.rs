//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: Hardcoded in struct `Default` implementations
//! 2. **Config file**: TOML file specified by `MARKETGATE_CONFIG` env var
//! 3. **Environment variables**: `MARKETGATE__SECTION__FIELD` overrides specific fields
//! 4. **Deployment variables**: the conventional `RPC_URL`, `RPC_FALLBACKS`, `DEV_FALLBACK_RPC`,
//!    `PUBLIC_READ_RPC`, `CONTRACT_ADDRESS`, `REDIS_URL` and `RATE_LIMIT_ROUTES`
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: HTTP server settings (bind address, concurrency)
//! - [`RpcConfig`]: Candidate endpoints, probing, call timeouts and retries
//! - [`CacheConfig`]: TTLs per key class, stale window, size bounds
//! - [`RedisConfig`]: Distributed cache connection
//! - [`RateLimitConfig`]: Fixed-window limits with per-route overrides
//! - [`MarketsConfig`]: Input bounds and top-N aggregation
//! - [`TelemetryConfig`]: Security event counters
//! - [`LoggingConfig`]: Log level and format
//!
//! # Example
//!
//! ```toml
//! environment = "production"
//!
//! [rpc]
//! primary_url = "https://rpc.example.com"
//! fallback_urls = "https://rpc-2.example.com, https://rpc-3.example.com"
//! contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
//!
//! [rate_limit.routes.market]
//! requests = 30
//! window_seconds = 60
//! ```

use crate::types::Environment;
use config::{Config, ConfigError, Environment as EnvSource, File};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, time::Duration};

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `3030`.
    pub bind_port: u16,

    /// Maximum number of concurrent requests the server handles. Defaults to `100`.
    pub max_concurrent_requests: usize,

    /// Request timeout in seconds. Defaults to `30`.
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            bind_port: 3030,
            max_concurrent_requests: 100,
            request_timeout_seconds: 30,
        }
    }
}

/// Upstream RPC candidates and call behavior.
///
/// Each URL field may hold several URLs separated by commas or whitespace. Candidates are
/// tried in field order: primary, fallbacks, dev fallback (permissive environments only),
/// public read endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub primary_url: String,
    pub fallback_urls: String,
    pub dev_fallback_url: String,
    pub public_read_url: String,

    /// Market contract address. When set, endpoints must serve code at this address.
    pub contract_address: String,

    /// Probe candidates before use. When disabled the first candidate is always used.
    pub probe_enabled: bool,

    /// Per-probe timeout in milliseconds, floored at 200. Defaults to `1200`.
    pub probe_timeout_ms: u64,

    /// How long a selected endpoint is reused before re-probing. Defaults to `10000`.
    pub selection_cache_ms: u64,

    /// Return the first candidate when every probe fails. Defaults to `true`.
    pub fail_open: bool,

    /// Timeout for a single contract read in milliseconds. Defaults to `8000`.
    pub call_timeout_ms: u64,

    /// Attempts per contract read, including the first. Defaults to `3`.
    pub retry_attempts: u32,

    /// Delay between attempts in milliseconds. Defaults to `300`.
    pub retry_delay_ms: u64,

    /// Worker count for batch reads. Defaults to `6`.
    pub batch_concurrency: usize,

    /// Maximum concurrent outbound HTTP requests. Defaults to `64`.
    pub max_concurrent_calls: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            primary_url: String::new(),
            fallback_urls: String::new(),
            dev_fallback_url: String::new(),
            public_read_url: String::new(),
            contract_address: String::new(),
            probe_enabled: true,
            probe_timeout_ms: 1200,
            selection_cache_ms: 10_000,
            fail_open: true,
            call_timeout_ms: 8000,
            retry_attempts: 3,
            retry_delay_ms: 300,
            batch_concurrency: 6,
            max_concurrent_calls: 64,
        }
    }
}

/// In-process cache sizing and TTLs per key class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries in each freshness cache. Defaults to `1000`.
    pub max_entries: usize,

    /// Age after which an entry is no longer served even as stale. Defaults to `300`.
    pub stale_ttl_seconds: u64,

    pub market_ttl_seconds: u64,
    pub page_ttl_seconds: u64,
    pub top_ttl_seconds: u64,
    pub count_ttl_seconds: u64,

    /// Lifetime of a confirmed-absent marker. Defaults to `30`.
    pub negative_ttl_seconds: u64,
    pub negative_max_entries: usize,

    /// Maximum concurrently coordinated computations. Defaults to `1000`.
    pub inflight_max_entries: usize,

    /// How long a follower waits on an in-flight computation. Defaults to `3000`.
    pub inflight_wait_ms: u64,

    /// Largest payload written to or read from the distributed tier. Defaults to 256 KiB.
    pub max_payload_bytes: usize,

    /// `max-age` advertised on placeholder responses. Defaults to `5`.
    pub placeholder_max_age_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            stale_ttl_seconds: 300,
            market_ttl_seconds: 15,
            page_ttl_seconds: 15,
            top_ttl_seconds: 10,
            count_ttl_seconds: 5,
            negative_ttl_seconds: 30,
            negative_max_entries: 5000,
            inflight_max_entries: 1000,
            inflight_wait_ms: 3000,
            max_payload_bytes: 256 * 1024,
            placeholder_max_age_seconds: 5,
        }
    }
}

/// Distributed cache connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection string. Empty disables the distributed tier.
    pub url: String,

    /// Deadline for the initial connection. Defaults to `1200`.
    pub connect_timeout_ms: u64,

    /// Deadline for the startup `PING` and every later command. Defaults to `800`.
    pub command_timeout_ms: u64,

    /// Namespace prepended to every key. Defaults to `marketgate:v1:`.
    pub key_prefix: String,

    /// Use a single-process in-memory store when no Redis URL is set.
    pub memory_fallback: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_ms: 1200,
            command_timeout_ms: 800,
            key_prefix: "marketgate:v1:".to_string(),
            memory_fallback: false,
        }
    }
}

/// Limit for one route scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteLimit {
    pub requests: u32,
    pub window_seconds: u64,
}

/// Fixed-window rate limiting of the upstream path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Requests allowed per window when a route has no override. Defaults to `60`.
    pub requests: u32,

    /// Window length in seconds. Defaults to `60`.
    pub window_seconds: u64,

    /// Upper bound on in-process counters. Defaults to `100000`.
    pub max_tracked_clients: usize,

    /// Interval of the background sweep over expired windows. Defaults to `60`.
    pub cleanup_interval_seconds: u64,

    /// Per-route overrides keyed by scope (`market`, `markets`, `top-markets`).
    pub routes: HashMap<String, RouteLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: 60,
            window_seconds: 60,
            max_tracked_clients: 100_000,
            cleanup_interval_seconds: 60,
            routes: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Effective limit for a route scope.
    #[must_use]
    pub fn limit_for(&self, scope: &str) -> RouteLimit {
        self.routes.get(scope).copied().unwrap_or(RouteLimit {
            requests: self.requests,
            window_seconds: self.window_seconds,
        })
    }
}

/// Input bounds and aggregation sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketsConfig {
    pub max_market_id: u64,
    pub default_page_limit: u32,
    pub max_page_limit: u32,

    /// Markets returned by the top endpoint. Defaults to `3`.
    pub top_n: usize,

    /// Most recent markets scanned by the top endpoint. Defaults to `1000`.
    pub top_scan_limit: u64,

    /// Fetch `getMarketBasics` alongside `getMarket`. Defaults to `true`.
    pub include_basics: bool,

    /// Fetch `getMarketAdmin` for single-market reads. Defaults to `true`.
    pub include_admin: bool,
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            max_market_id: 10_000_000,
            default_page_limit: 50,
            max_page_limit: 200,
            top_n: 3,
            top_scan_limit: 1000,
            include_basics: true,
            include_admin: true,
        }
    }
}

/// Security event counters flushed to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub flush_interval_seconds: u64,
    pub max_keys: usize,
    pub top_keys: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: false, flush_interval_seconds: 60, max_keys: 2000, top_keys: 50 }
    }
}

/// Prometheus metrics exposure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether `/metrics` is served. Defaults to `true`.
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Root application configuration containing all subsystem settings.
///
/// Loaded with the `MARKETGATE` prefix for environment overrides using `__` as a separator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment. Defaults to `development`.
    pub environment: Environment,
    pub server: ServerConfig,
    pub rpc: RpcConfig,
    pub cache: CacheConfig,
    pub redis: RedisConfig,
    pub rate_limit: RateLimitConfig,
    pub markets: MarketsConfig,
    pub telemetry: TelemetryConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Use `__` as a separator for nested fields (e.g., `MARKETGATE__SERVER__BIND_PORT=8080`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("environment", "development")?
            .set_default("server.bind_address", "127.0.0.1")?
            .set_default("server.bind_port", 3030)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(
                EnvSource::with_prefix("MARKETGATE").prefix_separator("__").separator("__"),
            )
            .build()?;

        let mut app: Self = config.try_deserialize()?;
        app.apply_deployment_overrides(|key| std::env::var(key).ok());
        Ok(app)
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The config file path can be overridden using the `MARKETGATE_CONFIG` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("MARKETGATE_CONFIG")
            .unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Applies the conventional deployment variables on top of the layered config.
    ///
    /// Non-empty values win over file and prefixed settings.
    pub fn apply_deployment_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("RPC_URL") {
            self.rpc.primary_url = v;
        }
        if let Some(v) = get("RPC_FALLBACKS") {
            self.rpc.fallback_urls = v;
        }
        if let Some(v) = get("DEV_FALLBACK_RPC") {
            self.rpc.dev_fallback_url = v;
        }
        if let Some(v) = get("PUBLIC_READ_RPC") {
            self.rpc.public_read_url = v;
        }
        if let Some(v) = get("CONTRACT_ADDRESS") {
            self.rpc.contract_address = v;
        }
        if let Some(v) = get("REDIS_URL") {
            self.redis.url = v;
        }
        if let Some(v) = get("RATE_LIMIT_ROUTES") {
            for (scope, limit) in parse_route_limits(&v) {
                self.rate_limit.routes.insert(scope, limit);
            }
        }
    }

    /// Returns the parsed socket address for the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
            .parse()
            .map_err(|_| {
                format!(
                    "Invalid socket address: {}:{}",
                    self.server.bind_address, self.server.bind_port
                )
            })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }

        if self.server.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }

        let address = self.rpc.contract_address.trim();
        if !address.is_empty() && !is_contract_address(address) {
            return Err(format!("Invalid contract address: {address}"));
        }

        if self.rpc.retry_attempts == 0 {
            return Err("RPC retry attempts must be at least 1".to_string());
        }

        if self.rpc.batch_concurrency == 0 || self.rpc.max_concurrent_calls == 0 {
            return Err("RPC concurrency limits must be greater than 0".to_string());
        }

        let cache = &self.cache;
        if cache.max_entries == 0 ||
            cache.negative_max_entries == 0 ||
            cache.inflight_max_entries == 0
        {
            return Err("Cache size bounds must be greater than 0".to_string());
        }

        if [
            cache.market_ttl_seconds,
            cache.page_ttl_seconds,
            cache.top_ttl_seconds,
            cache.count_ttl_seconds,
            cache.negative_ttl_seconds,
        ]
        .contains(&0)
        {
            return Err("Cache TTLs must be greater than 0".to_string());
        }

        if cache.stale_ttl_seconds < cache.market_ttl_seconds.max(cache.page_ttl_seconds) {
            return Err("Stale TTL must not be shorter than the freshness TTLs".to_string());
        }

        if self.rate_limit.window_seconds == 0 ||
            self.rate_limit.routes.values().any(|r| r.window_seconds == 0)
        {
            return Err("Rate limit windows must be greater than 0".to_string());
        }

        let markets = &self.markets;
        if markets.max_page_limit == 0 || markets.max_page_limit > 200 {
            return Err("Max page limit must be between 1 and 200".to_string());
        }
        if markets.default_page_limit == 0 || markets.default_page_limit > markets.max_page_limit {
            return Err("Default page limit must be between 1 and the max page limit".to_string());
        }
        if markets.top_n == 0 {
            return Err("Top market count must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }
}

/// `0x` followed by 40 hex characters.
#[must_use]
pub fn is_contract_address(address: &str) -> bool {
    address.len() == 42 &&
        (address.starts_with("0x") || address.starts_with("0X")) &&
        address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Parses `scope=requests/window` pairs separated by commas, skipping malformed entries.
fn parse_route_limits(raw: &str) -> Vec<(String, RouteLimit)> {
    raw.split(',')
        .filter_map(|pair| {
            let (scope, limit) = pair.split_once('=')?;
            let (requests, window) = limit.split_once('/')?;
            Some((
                scope.trim().to_string(),
                RouteLimit {
                    requests: requests.trim().parse().ok()?,
                    window_seconds: window.trim().parse().ok()?,
                },
            ))
        })
        .filter(|(scope, limit)| !scope.is_empty() && limit.window_seconds > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.server.bind_port, 3030);
        assert_eq!(config.rpc.probe_timeout_ms, 1200);
        assert_eq!(config.rpc.selection_cache_ms, 10_000);
        assert!(config.rpc.fail_open);
        assert_eq!(config.cache.market_ttl_seconds, 15);
        assert_eq!(config.cache.top_ttl_seconds, 10);
        assert_eq!(config.rate_limit.requests, 60);
        assert_eq!(config.markets.max_market_id, 10_000_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.rpc.contract_address = "0x1234".to_string();
        assert!(config.validate().is_err());

        config.rpc.contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string();
        assert!(config.validate().is_ok());

        config.markets.max_page_limit = 500;
        assert!(config.validate().is_err());

        config.markets.max_page_limit = 200;
        config.cache.negative_ttl_seconds = 0;
        assert!(config.validate().is_err());

        config.cache.negative_ttl_seconds = 30;
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_route_limit_fallback_to_default() {
        let mut config = RateLimitConfig::default();
        config.routes.insert("market".to_string(), RouteLimit { requests: 5, window_seconds: 10 });

        assert_eq!(config.limit_for("market"), RouteLimit { requests: 5, window_seconds: 10 });
        assert_eq!(config.limit_for("markets"), RouteLimit { requests: 60, window_seconds: 60 });
    }

    #[test]
    fn test_deployment_overrides() {
        let mut config = AppConfig::default();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("RPC_URL", " https://primary.example.com "),
            ("RPC_FALLBACKS", "https://a.example.com,https://b.example.com"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
            ("PUBLIC_READ_RPC", ""),
            ("RATE_LIMIT_ROUTES", "market=10/30, top-markets=5/60, broken, bad=1/0"),
        ]);

        config.apply_deployment_overrides(|key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.rpc.primary_url, "https://primary.example.com");
        assert_eq!(config.rpc.fallback_urls, "https://a.example.com,https://b.example.com");
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379");
        assert!(config.rpc.public_read_url.is_empty());
        assert_eq!(config.rate_limit.routes.len(), 2);
        assert_eq!(
            config.rate_limit.limit_for("top-markets"),
            RouteLimit { requests: 5, window_seconds: 60 }
        );
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
environment = "production"

[server]
bind_port = 8080

[rpc]
primary_url = "https://rpc.example.com"
fail_open = false

[cache]
market_ttl_seconds = 20

[rate_limit.routes.markets]
requests = 120
window_seconds = 60
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.server.bind_port, 8080);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.rpc.primary_url, "https://rpc.example.com");
        assert!(!config.rpc.fail_open);
        assert_eq!(config.rpc.call_timeout_ms, 8000);
        assert_eq!(config.cache.market_ttl_seconds, 20);
        assert_eq!(config.rate_limit.limit_for("markets").requests, 120);
    }

    #[test]
    fn test_is_contract_address() {
        assert!(is_contract_address("0x5FbDB2315678afecb367f032d93F642f64180aa3"));
        assert!(!is_contract_address("5FbDB2315678afecb367f032d93F642f64180aa3"));
        assert!(!is_contract_address("0xZZbDB2315678afecb367f032d93F642f64180aa3"));
    }
}
