use crate::{config::RpcConfig, types::Environment, utils::redact_url};

/// Splits a list of URLs separated by commas and/or whitespace.
pub fn split_rpc_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|c: char| c == ',' || c.is_whitespace()).map(str::trim).filter(|s| !s.is_empty())
}

/// Whether `url` uses an `http` or `https` scheme.
#[must_use]
pub fn is_http_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Ordered, deduplicated endpoint candidates.
///
/// Primary first, then explicit fallbacks, then the development fallback (permissive
/// environments only), then the public read endpoint as the last resort.
#[must_use]
pub fn build_candidates(config: &RpcConfig, environment: Environment) -> Vec<String> {
    let dev_fallback = if environment.is_strict() { "" } else { config.dev_fallback_url.as_str() };

    let sources = [
        config.primary_url.as_str(),
        config.fallback_urls.as_str(),
        dev_fallback,
        config.public_read_url.as_str(),
    ];

    let mut candidates: Vec<String> = Vec::new();
    for url in sources.into_iter().flat_map(split_rpc_list) {
        if !candidates.iter().any(|c| c == url) {
            candidates.push(url.to_string());
        }
    }
    candidates
}

/// Candidate list with credentials and API keys masked, for logs and the CLI.
#[must_use]
pub fn redacted_candidates(config: &RpcConfig, environment: Environment) -> Vec<String> {
    build_candidates(config, environment).iter().map(|u| redact_url(u)).collect()
}
