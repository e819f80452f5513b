use thiserror::Error;

/// Revert reasons that mean the requested market does not exist.
pub const MISSING_ENTITY_PATTERNS: [&str; 5] =
    ["does not exist", "not exist", "not found", "invalid market", "nonexistent"];

/// Classification of JSON-RPC errors for retry decisions.
///
/// - Client errors are never retried
/// - Provider errors and rate limits are transient
/// - Execution errors (reverts) are forwarded as answers, not retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorCategory {
    /// Invalid request, method not found, invalid params.
    ClientError,
    /// Internal or server errors on the provider side.
    ProviderError,
    /// Provider quota exceeded (`-32005`).
    RateLimit,
    /// The provider could not parse our request (`-32700`).
    ParseError,
    /// Contract execution failed (reverts, out of gas).
    ExecutionError,
}

impl RpcErrorCategory {
    /// Buckets a JSON-RPC error object.
    ///
    /// Code `3` is the geth-style "execution reverted" with revert data. In the -32000 to
    /// -32099 server range the message decides between execution and provider errors.
    #[must_use]
    pub fn from_code_and_message(code: i32, message: &str) -> Self {
        match code {
            3 => Self::ExecutionError,
            -32700 => Self::ParseError,
            -32602..=-32600 => Self::ClientError,
            -32603 => Self::ProviderError,
            -32005 => Self::RateLimit,
            -32099..=-32000 => {
                let lower = message.to_lowercase();
                if lower.contains("revert") || lower.contains("out of gas") {
                    Self::ExecutionError
                } else {
                    Self::ProviderError
                }
            }
            _ => Self::ProviderError,
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimit | Self::ProviderError)
    }

    /// Metrics label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientError => "client_error",
            Self::ProviderError => "provider_error",
            Self::RateLimit => "rate_limit",
            Self::ParseError => "parse_error",
            Self::ExecutionError => "execution_error",
        }
    }
}

/// Errors that can occur when talking to an RPC endpoint.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Request exceeded its deadline.
    #[error("Request timeout")]
    Timeout,

    /// Failed to establish a connection to the endpoint.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Non-2xx HTTP status. Fields are the status code and response body or reason.
    #[error("HTTP error: {0}")]
    HttpError(u16, String),

    /// JSON-RPC error object. Fields are the RPC error code and message.
    #[error("RPC error {0}: {1}")]
    RpcError(i32, String),

    /// Response could not be parsed or ABI-decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No RPC endpoint is configured.
    #[error("RPC not configured")]
    NotConfigured,

    /// Request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Maximum concurrent upstream calls reached.
    #[error("Concurrency limit reached: {0}")]
    ConcurrencyLimit(String),
}

impl UpstreamError {
    #[must_use]
    pub fn rpc_category(&self) -> Option<RpcErrorCategory> {
        match self {
            Self::RpcError(code, message) => {
                Some(RpcErrorCategory::from_code_and_message(*code, message))
            }
            _ => None,
        }
    }

    /// Returns `true` if retrying the same call may succeed.
    ///
    /// Transient errors include timeouts, network and connection errors, HTTP 5xx and 429,
    /// and JSON-RPC provider or rate-limit errors.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::ConnectionFailed(_) | Self::ConcurrencyLimit(_) => true,
            Self::HttpError(status, _) => (500..=599).contains(status) || *status == 429,
            Self::RpcError(_, _) => self.rpc_category().is_some_and(|cat| cat.is_transient()),
            _ => false,
        }
    }

    /// Returns `true` if the contract reported the requested entity as nonexistent.
    ///
    /// Matches the revert message against [`MISSING_ENTITY_PATTERNS`], case-insensitively.
    #[must_use]
    pub fn is_missing_entity(&self) -> bool {
        let Self::RpcError(_, message) = self else {
            return false;
        };

        if self.rpc_category() != Some(RpcErrorCategory::ExecutionError) &&
            !message.to_lowercase().contains("revert")
        {
            return false;
        }

        let lower = message.to_lowercase();
        MISSING_ENTITY_PATTERNS.iter().any(|pattern| lower.contains(pattern))
    }

    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailed(_) => "connection",
            Self::HttpError(_, _) => "http",
            Self::RpcError(_, _) => self.rpc_category().map_or("rpc", |c| c.as_str()),
            Self::InvalidResponse(_) => "invalid_response",
            Self::NotConfigured => "not_configured",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ConcurrencyLimit(_) => "concurrency_limit",
        }
    }
}
