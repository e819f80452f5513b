use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::upstream::UpstreamError;

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: &'a serde_json::Value,
    pub id: u64,
}

/// `error` member of a failed call.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response envelope. Exactly one of `result` and `error` is expected.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// Outbound concurrency for all RPC calls of one process.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// In-flight calls across every endpoint.
    pub concurrent_limit: usize,
    /// How long a call may queue for a slot before failing with a timeout.
    pub permit_timeout_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self { concurrent_limit: 64, permit_timeout_ms: 500 }
    }
}

/// JSON-RPC over HTTP with semaphore-based concurrency control.
///
/// Performs exactly one HTTP attempt per call. Retrying is the caller's decision
/// (see [`crate::upstream::retry`]).
pub struct HttpClient {
    client: Client,
    concurrent_limit: Arc<Semaphore>,
    config: HttpClientConfig,
    next_id: AtomicU64,
}

/// One outbound slot, held for the whole call including the body read.
struct CallSlot {
    _permit: OwnedSemaphorePermit,
    pool: Arc<Semaphore>,
}

impl CallSlot {
    fn free_slots(&self) -> usize {
        self.pool.available_permits()
    }
}

impl Drop for CallSlot {
    fn drop(&mut self) {
        tracing::trace!(free_slots = self.pool.available_permits(), "rpc slot released");
    }
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns [`UpstreamError::ConnectionFailed`] if the TLS client cannot be built.
    pub fn new() -> Result<Self, UpstreamError> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Transport failure without the URL, which may carry an API key.
    fn transport_error(error: &reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            return UpstreamError::Timeout;
        }
        let kind = if error.is_connect() {
            "endpoint unreachable"
        } else if error.is_body() || error.is_decode() {
            "unreadable response body"
        } else if error.is_request() {
            "request could not be sent"
        } else {
            "transport error"
        };
        UpstreamError::ConnectionFailed(kind.to_string())
    }

    /// # Errors
    ///
    /// Returns [`UpstreamError::ConnectionFailed`] if the TLS client cannot be built.
    pub fn with_config(config: HttpClientConfig) -> Result<Self, UpstreamError> {
        let client = ClientBuilder::new()
            .use_rustls_tls()
            .user_agent(concat!("marketgate/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(3))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "rpc http client could not be built");
                UpstreamError::ConnectionFailed(format!("http client: {e}"))
            })?;

        Ok(Self {
            client,
            concurrent_limit: Arc::new(Semaphore::new(config.concurrent_limit.max(1))),
            config,
            next_id: AtomicU64::new(1),
        })
    }

    /// POSTs `body` once, waiting at most `permit_timeout_ms` for an outbound slot.
    ///
    /// # Errors
    ///
    /// [`UpstreamError::Timeout`] when queueing or the call exceeds its deadline,
    /// [`UpstreamError::HttpError`] with a truncated body for non-2xx answers and
    /// [`UpstreamError::ConnectionFailed`] for transport failures.
    pub async fn send_request(
        &self,
        url: &str,
        body: bytes::Bytes,
        timeout: Duration,
    ) -> Result<bytes::Bytes, UpstreamError> {
        let permit_timeout = Duration::from_millis(self.config.permit_timeout_ms);

        let pool = Arc::clone(&self.concurrent_limit);
        let Ok(acquired) = tokio::time::timeout(permit_timeout, pool.acquire_owned()).await
        else {
            tracing::warn!(
                free_slots = self.concurrent_limit.available_permits(),
                "timed out waiting for an rpc slot"
            );
            return Err(UpstreamError::Timeout);
        };
        let permit =
            acquired.map_err(|_| UpstreamError::ConcurrencyLimit("rpc slots closed".to_string()))?;
        let slot = CallSlot { _permit: permit, pool: Arc::clone(&self.concurrent_limit) };

        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::trace!(free_slots = slot.free_slots(), "rpc request failed");
                Self::transport_error(&e)
            })?;

        let status = response.status();
        if status.is_success() {
            return response.bytes().await.map_err(|e| Self::transport_error(&e));
        }

        let text = response.text().await.unwrap_or_default();
        Err(UpstreamError::HttpError(status.as_u16(), truncate_body(text)))
    }

    /// Issues a JSON-RPC call and returns its `result`.
    ///
    /// # Errors
    ///
    /// Transport errors as for [`Self::send_request`], [`UpstreamError::RpcError`] for a
    /// JSON-RPC error object, and [`UpstreamError::InvalidResponse`] for a malformed envelope.
    pub async fn call(
        &self,
        url: &str,
        method: &str,
        params: &serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, UpstreamError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let body = serde_json::to_vec(&request)
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;

        let raw = self.send_request(url, bytes::Bytes::from(body), timeout).await?;

        let response: JsonRpcResponse = serde_json::from_slice(&raw)
            .map_err(|e| UpstreamError::InvalidResponse(format!("malformed JSON-RPC body: {e}")))?;

        if let Some(error) = response.error {
            let reason = error.data.as_ref().and_then(super::contract::decode_revert_reason);
            let message = match reason {
                Some(reason) if !error.message.contains(&reason) => {
                    format!("{}: {reason}", error.message)
                }
                _ => error.message,
            };
            return Err(UpstreamError::RpcError(error.code, message));
        }

        response
            .result
            .ok_or_else(|| UpstreamError::InvalidResponse("missing result".to_string()))
    }

    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.concurrent_limit.available_permits()
    }
}

/// Keeps error bodies short enough for logs and error details.
fn truncate_body(text: String) -> String {
    const MAX_CHARS: usize = 256;
    match text.char_indices().nth(MAX_CHARS) {
        Some((cut, _)) => format!("{}... (truncated)", &text[..cut]),
        None => text,
    }
}
