use marketgate_core::{
    config::AppConfig,
    upstream::{
        build_candidates, candidates::is_http_url, EndpointResolver, EndpointSelector, HttpClient,
        ProbeReport,
    },
    utils::{redact_url, Clock, SystemClock},
};
use prettytable::{row, Table};
use std::sync::Arc;

use super::utils::{load_config, print_error, print_info, print_success, CliError, CliResult};

/// One row per candidate: priority, masked URL and whether the scheme is probeable.
fn candidate_rows(config: &AppConfig) -> Vec<(usize, String, &'static str)> {
    build_candidates(&config.rpc, config.environment)
        .iter()
        .enumerate()
        .map(|(i, url)| {
            let scheme = if is_http_url(url) { "http" } else { "unsupported" };
            (i + 1, redact_url(url), scheme)
        })
        .collect()
}

fn report_rows(reports: &[ProbeReport]) -> Vec<(String, &'static str, String)> {
    reports
        .iter()
        .map(|r| {
            let status = if r.reason.is_healthy() { "healthy" } else { "rejected" };
            let reason = format!("{} ({}ms)", r.reason.as_str(), r.elapsed.as_millis());
            (redact_url(&r.url), status, reason)
        })
        .collect()
}

pub fn list_endpoints(file: &str) -> CliResult<()> {
    let config = load_config(file)?;
    let rows = candidate_rows(&config);

    if rows.is_empty() {
        print_error("No RPC candidates configured (set RPC_URL or [rpc].primary_url)");
        return Ok(());
    }

    print_info(&format!(
        "{} candidate(s) for environment '{}'",
        rows.len(),
        config.environment.as_str()
    ));

    let mut table = Table::new();
    table.add_row(row!["Priority", "Endpoint", "Scheme"]);
    for (priority, url, scheme) in rows {
        table.add_row(row![priority, url, scheme]);
    }
    table.printstd();

    Ok(())
}

pub async fn probe_endpoints(file: &str) -> CliResult<()> {
    let config = load_config(file)?;
    let candidates = build_candidates(&config.rpc, config.environment);
    if candidates.is_empty() {
        return Err(CliError::Config("no RPC candidates configured".to_string()));
    }

    let http = Arc::new(HttpClient::new().map_err(|e| CliError::Upstream(e.to_string()))?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let selector =
        EndpointSelector::new(&config.rpc, config.environment, candidates, http, clock);

    print_info("Probing candidates...");
    let reports = selector.probe_all().await;

    let mut table = Table::new();
    table.add_row(row!["Endpoint", "Status", "Reason"]);
    for (url, status, reason) in report_rows(&reports) {
        table.add_row(row![url, status, reason]);
    }
    table.printstd();

    match selector.resolve().await {
        Some(url) => print_success(&format!("Selected endpoint: {}", redact_url(&url))),
        None => print_error("No endpoint selected (fail-open disabled and nothing healthy)"),
    }

    Ok(())
}
