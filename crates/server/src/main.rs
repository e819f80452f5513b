use anyhow::Result;
use axum::serve;
use marketgate_core::{config::AppConfig, gateway::MarketGateway, metrics::MetricsCollector};
use rustls::crypto::{ring::default_provider, CryptoProvider};
use server::router;
use std::{net::SocketAddr, sync::Arc};
use tokio::{signal, sync::broadcast};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str =
    "warn,marketgate_core=info,server=info,marketgate_server=info,cli=info";

/// Initializes the logging system based on the configuration.
///
/// `RUST_LOG=debug` and `RUST_LOG=trace` raise the project crates only; any other value
/// is parsed as a full filter directive.
fn init_logging(config: &AppConfig) {
    let filter = match std::env::var("RUST_LOG").as_deref() {
        Ok("debug") => EnvFilter::new(
            "warn,marketgate_core=debug,server=debug,marketgate_server=debug,cli=debug",
        ),
        Ok("trace") => EnvFilter::new(
            "warn,marketgate_core=trace,server=trace,marketgate_server=trace,cli=trace",
        ),
        Ok(_) => {
            EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
        }
        Err(_) => EnvFilter::new(DEFAULT_FILTER),
    };

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    CryptoProvider::install_default(default_provider())
        .map_err(|e| anyhow::anyhow!("Failed to install crypto provider: {e:?}"))?;

    let config =
        AppConfig::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;
    config.validate().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    init_logging(&config);
    info!(environment = config.environment.as_str(), "Starting market read gateway");
    debug!(
        bind_port = config.server.bind_port,
        rate_limit_enabled = config.rate_limit.enabled,
        redis_configured = !config.redis.url.is_empty(),
        "Configuration loaded"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let metrics = Arc::new(
        MetricsCollector::new().map_err(|e| anyhow::anyhow!("Failed to initialize metrics: {e}"))?,
    );
    let addr: SocketAddr = config.socket_addr().map_err(|e| anyhow::anyhow!(e))?;
    let gateway = Arc::new(
        MarketGateway::from_config(config.clone(), metrics)
            .await
            .map_err(|e| anyhow::anyhow!("Gateway initialization failed: {e}"))?,
    );
    let background = gateway.start_background_tasks(&shutdown_tx);

    let app = router::create_app(gateway, &config);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Gateway listening");

    if let Err(e) = serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error occurred");
    }

    let _ = shutdown_tx.send(());
    for handle in background {
        if let Err(e) = handle.await {
            error!(error = %e, "Background task terminated abnormally");
        }
    }
    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, draining in-flight requests");
}
