use marketgate_core::{
    config::{AppConfig, RouteLimit},
    types::Environment,
};
use serial_test::serial;
use std::{fs, path::PathBuf};

const DEPLOYMENT_VARS: [&str; 8] = [
    "RPC_URL",
    "RPC_FALLBACKS",
    "DEV_FALLBACK_RPC",
    "PUBLIC_READ_RPC",
    "CONTRACT_ADDRESS",
    "REDIS_URL",
    "RATE_LIMIT_ROUTES",
    "MARKETGATE__SERVER__BIND_PORT",
];

/// Restores the variable to its previous value on drop.
struct EnvVarGuard {
    key: &'static str,
    original: Option<String>,
}

impl EnvVarGuard {
    fn set(key: &'static str, value: Option<&str>) -> Self {
        let original = std::env::var(key).ok();
        match value {
            Some(v) => std::env::set_var(key, v),
            None => std::env::remove_var(key),
        }
        Self { key, original }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match self.original.as_deref() {
            Some(v) => std::env::set_var(self.key, v),
            None => std::env::remove_var(self.key),
        }
    }
}

fn clear_deployment_vars() -> Vec<EnvVarGuard> {
    DEPLOYMENT_VARS.iter().map(|key| EnvVarGuard::set(key, None)).collect()
}

fn write_config(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("marketgate-{}-{name}.toml", std::process::id()));
    fs::write(&path, contents).unwrap();
    path
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    let _clean = clear_deployment_vars();

    let config = AppConfig::from_file("/nonexistent/marketgate/config.toml").unwrap();

    assert_eq!(config.environment, Environment::Development);
    assert_eq!(config.server.bind_address, "127.0.0.1");
    assert_eq!(config.server.bind_port, 3030);
    assert_eq!(config.logging.format, "pretty");
    assert!(config.rpc.primary_url.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_file_values_are_loaded() {
    let _clean = clear_deployment_vars();
    let path = write_config(
        "file",
        r#"
environment = "production"

[server]
bind_port = 8181

[rpc]
primary_url = "https://rpc.example.com"
contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"

[rate_limit.routes.top-markets]
requests = 10
window_seconds = 30
"#,
    );

    let config = AppConfig::from_file(&path).unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(config.environment, Environment::Production);
    assert_eq!(config.server.bind_port, 8181);
    assert_eq!(config.rpc.primary_url, "https://rpc.example.com");
    assert_eq!(
        config.rate_limit.limit_for("top-markets"),
        RouteLimit { requests: 10, window_seconds: 30 }
    );
    assert!(config.validate().is_ok());
    assert_eq!(config.socket_addr().unwrap().port(), 8181);
}

#[test]
#[serial]
fn test_prefixed_env_overrides_file() {
    let _clean = clear_deployment_vars();
    let path = write_config("prefixed", "[server]\nbind_port = 8181\n");
    let _port = EnvVarGuard::set("MARKETGATE__SERVER__BIND_PORT", Some("9090"));

    let config = AppConfig::from_file(&path).unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(config.server.bind_port, 9090);
}

#[test]
#[serial]
fn test_deployment_vars_win_over_file() {
    let _clean = clear_deployment_vars();
    let path = write_config(
        "deployment",
        r#"
[rpc]
primary_url = "https://from-file.example.com"

[redis]
url = "redis://file-host:6379"
"#,
    );
    let _rpc = EnvVarGuard::set("RPC_URL", Some("https://from-env.example.com"));
    let _fallbacks = EnvVarGuard::set(
        "RPC_FALLBACKS",
        Some("https://a.example.com, https://b.example.com"),
    );
    let _contract =
        EnvVarGuard::set("CONTRACT_ADDRESS", Some("0x5FbDB2315678afecb367f032d93F642f64180aa3"));
    let _redis = EnvVarGuard::set("REDIS_URL", Some("redis://env-host:6379"));
    let _routes = EnvVarGuard::set("RATE_LIMIT_ROUTES", Some("market=5/10,markets=oops"));

    let config = AppConfig::from_file(&path).unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(config.rpc.primary_url, "https://from-env.example.com");
    assert_eq!(config.rpc.fallback_urls, "https://a.example.com, https://b.example.com");
    assert_eq!(config.redis.url, "redis://env-host:6379");
    assert_eq!(
        config.rate_limit.limit_for("market"),
        RouteLimit { requests: 5, window_seconds: 10 }
    );
    assert!(!config.rate_limit.routes.contains_key("markets"));
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_blank_deployment_var_is_ignored() {
    let _clean = clear_deployment_vars();
    let path = write_config("blank", "[rpc]\nprimary_url = \"https://from-file.example.com\"\n");
    let _rpc = EnvVarGuard::set("RPC_URL", Some("   "));

    let config = AppConfig::from_file(&path).unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(config.rpc.primary_url, "https://from-file.example.com");
}

#[test]
#[serial]
fn test_validate_rejects_bad_values() {
    let _clean = clear_deployment_vars();
    let _contract = EnvVarGuard::set("CONTRACT_ADDRESS", Some("0xnot-an-address"));

    let config = AppConfig::from_file("/nonexistent/marketgate/config.toml").unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.contains("Invalid contract address"));

    let mut config = AppConfig::default();
    config.logging.format = "yaml".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.cache.stale_ttl_seconds = 1;
    assert!(config.validate().is_err());
}
