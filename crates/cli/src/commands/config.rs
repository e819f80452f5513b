use clap::Subcommand;
use marketgate_core::{config::AppConfig, upstream::candidates::split_rpc_list, utils::redact_url};
use std::path::Path;

use super::utils::{load_config, print_info, print_success, CliError, CliResult};

const SAMPLE_CONFIG: &str = r#"# Marketgate read gateway configuration
# Values here are overridden by MARKETGATE__SECTION__FIELD and by
# RPC_URL, RPC_FALLBACKS, DEV_FALLBACK_RPC, PUBLIC_READ_RPC, CONTRACT_ADDRESS, REDIS_URL.

environment = "development"

[server]
bind_address = "127.0.0.1"
bind_port = 3030
max_concurrent_requests = 100
request_timeout_seconds = 30

[rpc]
primary_url = "https://rpc.example.com/YOUR_API_KEY"
fallback_urls = ""
contract_address = ""
probe_timeout_ms = 1200
fail_open = true

[cache]
stale_ttl_seconds = 300
market_ttl_seconds = 15
page_ttl_seconds = 15
top_ttl_seconds = 10
negative_ttl_seconds = 30

[redis]
url = ""
key_prefix = "marketgate:v1:"

[rate_limit]
enabled = true
requests = 60
window_seconds = 60

[rate_limit.routes.market]
requests = 120
window_seconds = 60

[markets]
default_page_limit = 50
max_page_limit = 200
top_n = 3

[telemetry]
enabled = false

[logging]
level = "info"
format = "pretty"
"#;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the effective configuration
    Validate {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Print the effective configuration as TOML
    Show {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        /// Print RPC and Redis URLs unmasked
        #[arg(long)]
        show_sensitive: bool,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output path for the config file
        #[arg(short, long, default_value = "config/config.toml")]
        output: String,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config_command(command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Validate { file } => validate_config(&file),
        ConfigCommands::Show { file, show_sensitive } => show_config(&file, show_sensitive),
        ConfigCommands::Generate { output, force } => generate_config(&output, force),
    }
}

fn validate_config(file: &str) -> CliResult<()> {
    print_info(&format!("Loading configuration from {file}..."));
    let config = load_config(file)?;
    config.validate().map_err(CliError::Config)?;

    print_success("Configuration is valid!");

    println!("Configuration Summary:");
    println!("  Environment: {}", config.environment.as_str());
    println!("  Server: {}:{}", config.server.bind_address, config.server.bind_port);
    println!(
        "  Contract: {}",
        if config.rpc.contract_address.is_empty() { "(none)" } else { &config.rpc.contract_address }
    );
    println!(
        "  Distributed cache: {}",
        if config.redis.url.is_empty() { "disabled" } else { "redis" }
    );
    println!(
        "  Rate limiting: {}",
        if config.rate_limit.enabled { "enabled" } else { "disabled" }
    );

    Ok(())
}

fn mask_url_list(raw: &str) -> String {
    split_rpc_list(raw).map(redact_url).collect::<Vec<_>>().join(", ")
}

/// Masks credentials in every URL-bearing field.
fn redacted(mut config: AppConfig) -> AppConfig {
    let rpc = &mut config.rpc;
    rpc.primary_url = mask_url_list(&rpc.primary_url);
    rpc.fallback_urls = mask_url_list(&rpc.fallback_urls);
    rpc.dev_fallback_url = mask_url_list(&rpc.dev_fallback_url);
    rpc.public_read_url = mask_url_list(&rpc.public_read_url);
    config.redis.url = redact_url(&config.redis.url);
    config
}

fn render_config(config: AppConfig, show_sensitive: bool) -> CliResult<String> {
    let config = if show_sensitive { config } else { redacted(config) };
    toml::to_string_pretty(&config).map_err(|e| CliError::Config(e.to_string()))
}

fn show_config(file: &str, show_sensitive: bool) -> CliResult<()> {
    let config = load_config(file)?;
    println!("# Effective configuration ({file})");
    println!("{}", render_config(config, show_sensitive)?);
    Ok(())
}

fn generate_config(output: &str, force: bool) -> CliResult<()> {
    if Path::new(output).exists() && !force {
        return Err(CliError::Config(format!(
            "File {output} already exists. Use --force to overwrite."
        )));
    }

    if let Some(parent) = Path::new(output).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, SAMPLE_CONFIG)?;

    print_success(&format!("Sample configuration generated: {output}"));
    print_info("Set RPC_URL and CONTRACT_ADDRESS (or edit [rpc]) before starting the server");

    Ok(())
}
