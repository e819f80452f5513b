use crate::{middleware::ValidationError, upstream::UpstreamError, utils::redact_secrets};
use thiserror::Error;

/// Request-level failures, each with a fixed HTTP status and public message.
///
/// `Clone` so one computation's error can be shared by every coalesced waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Market not found")]
    NotFound,

    #[error("Upstream timeout")]
    UpstreamTimeout,

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("{0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound => 404,
            Self::RateLimited { .. } => 429,
            Self::UpstreamTimeout | Self::UpstreamUnavailable(_) | Self::Configuration(_) => 502,
            Self::Internal(_) => 500,
        }
    }

    /// Message safe to return to any client.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::NotFound => "Market not found".to_string(),
            Self::UpstreamTimeout => "Upstream timeout".to_string(),
            Self::UpstreamUnavailable(_) => "Upstream unavailable".to_string(),
            Self::RateLimited { .. } => "Too many requests".to_string(),
            Self::Configuration(message) => message.clone(),
            Self::Internal(_) => "Internal error".to_string(),
        }
    }

    /// Diagnostic detail with credentials and long tokens masked. Only for
    /// non-production responses.
    #[must_use]
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::UpstreamUnavailable(detail) | Self::Internal(detail) => {
                Some(redact_secrets(detail))
            }
            _ => None,
        }
    }

    /// `true` when the error is an answer about the data rather than a failure to get it.
    #[must_use]
    pub fn is_definitive(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound)
    }

    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound => "not_found",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::RateLimited { .. } => "rate_limited",
            Self::Configuration(_) => "configuration",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Timeout => Self::UpstreamTimeout,
            UpstreamError::NotConfigured => Self::Configuration("RPC not configured".to_string()),
            e => Self::UpstreamUnavailable(e.to_string()),
        }
    }
}
