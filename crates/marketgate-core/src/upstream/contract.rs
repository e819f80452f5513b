//! Contract read bindings.
//!
//! Each getter has an explicit Solidity signature. Return data is decoded through the
//! generated `*Call::abi_decode_returns` and then mapped to a Rust record by exactly one
//! function per getter. Calls go out as `eth_call` against the
//! configured contract at the `latest` block.

use super::{
    http_client::HttpClient,
    retry::{with_retry, with_timeout},
    UpstreamError,
};
use crate::{
    metrics::MetricsCollector,
    types::{MarketAdminFlags, MarketView},
};
use alloy_primitives::{hex, Bytes, U256};
use alloy_sol_types::{sol, Revert, SolCall, SolError, SolValue};
use async_trait::async_trait;
use serde_json::json;
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::time::Instant;

sol! {
    function marketCount() external view returns (uint256);
    function getMarket(uint256 marketId) external view returns (string question, uint256 yesPool, uint256 noPool, uint8 status, bool outcome, uint256 closeTime);
    function getMarketBasics(uint256 marketId) external view returns (string question, string description, string category);
    function getMarketAdmin(uint256 marketId) external view returns (bool paused, bool disputeUsed, bool disputeActive);
}

/// Core market fields from `getMarket`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketRecord {
    pub question: String,
    pub yes_pool: U256,
    pub no_pool: U256,
    pub status: u8,
    pub outcome: bool,
    pub close_time: U256,
}

impl MarketRecord {
    /// Flattens the record and the optional best-effort getters into the served view.
    #[must_use]
    pub fn into_view(
        self,
        id: u64,
        basics: Option<MarketBasics>,
        admin: Option<MarketAdmin>,
    ) -> MarketView {
        let (description, category) = match basics {
            Some(b) => (Some(b.description), Some(b.category)),
            None => (None, None),
        };

        MarketView {
            id,
            question: self.question,
            yes_pool: self.yes_pool.to_string(),
            no_pool: self.no_pool.to_string(),
            status: self.status,
            outcome: self.outcome,
            close_time: self.close_time.to_string(),
            description,
            category,
            admin: admin.map(|a| MarketAdminFlags {
                paused: a.paused,
                dispute_used: a.dispute_used,
                dispute_active: a.dispute_active,
            }),
        }
    }
}

/// Descriptive fields from `getMarketBasics`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketBasics {
    pub question: String,
    pub description: String,
    pub category: String,
}

/// Admin flags from `getMarketAdmin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketAdmin {
    pub paused: bool,
    pub dispute_used: bool,
    pub dispute_active: bool,
}

fn decode_failed(call: &str, e: &alloy_sol_types::Error) -> UpstreamError {
    UpstreamError::InvalidResponse(format!("{call} returned undecodable data: {e}"))
}

/// Maps `marketCount()` return data. Counts beyond `u64` saturate.
///
/// # Errors
///
/// [`UpstreamError::InvalidResponse`] when the data is not a single `uint256`.
pub fn map_market_count(data: &[u8]) -> Result<u64, UpstreamError> {
    let count = U256::abi_decode(data).map_err(|e| decode_failed("marketCount", &e))?;
    Ok(u64::try_from(count).unwrap_or(u64::MAX))
}

/// Maps `getMarket(uint256)` return data.
///
/// # Errors
///
/// [`UpstreamError::InvalidResponse`] when the data does not match the return tuple.
pub fn map_market(data: &[u8]) -> Result<MarketRecord, UpstreamError> {
    let market =
        getMarketCall::abi_decode_returns(data).map_err(|e| decode_failed("getMarket", &e))?;

    Ok(MarketRecord {
        question: market.question,
        yes_pool: market.yesPool,
        no_pool: market.noPool,
        status: market.status,
        outcome: market.outcome,
        close_time: market.closeTime,
    })
}

/// Maps `getMarketBasics(uint256)` return data.
///
/// # Errors
///
/// [`UpstreamError::InvalidResponse`] when the data does not match the return tuple.
pub fn map_market_basics(data: &[u8]) -> Result<MarketBasics, UpstreamError> {
    let basics = getMarketBasicsCall::abi_decode_returns(data)
        .map_err(|e| decode_failed("getMarketBasics", &e))?;

    Ok(MarketBasics {
        question: basics.question,
        description: basics.description,
        category: basics.category,
    })
}

/// Maps `getMarketAdmin(uint256)` return data.
///
/// # Errors
///
/// [`UpstreamError::InvalidResponse`] when the data does not match the return tuple.
pub fn map_market_admin(data: &[u8]) -> Result<MarketAdmin, UpstreamError> {
    let admin = getMarketAdminCall::abi_decode_returns(data)
        .map_err(|e| decode_failed("getMarketAdmin", &e))?;

    Ok(MarketAdmin {
        paused: admin.paused,
        dispute_used: admin.disputeUsed,
        dispute_active: admin.disputeActive,
    })
}

/// Extracts the `Error(string)` reason from JSON-RPC error `data`, if present.
#[must_use]
pub fn decode_revert_reason(data: &serde_json::Value) -> Option<String> {
    let raw = data.as_str().or_else(|| data.get("data").and_then(serde_json::Value::as_str))?;
    let bytes = Bytes::from_str(raw).ok()?;
    <Revert as SolError>::abi_decode(&bytes).ok().map(|revert| revert.reason)
}

/// Read access to the market contract through one endpoint.
///
/// The endpoint is passed per call so the gateway can resolve it per request.
#[async_trait]
pub trait MarketReader: Send + Sync {
    async fn market_count(&self, endpoint: &str) -> Result<u64, UpstreamError>;

    async fn market(&self, endpoint: &str, id: u64) -> Result<MarketRecord, UpstreamError>;

    async fn market_basics(&self, endpoint: &str, id: u64)
        -> Result<MarketBasics, UpstreamError>;

    async fn market_admin(&self, endpoint: &str, id: u64) -> Result<MarketAdmin, UpstreamError>;
}

/// [`MarketReader`] over JSON-RPC `eth_call`, with deadline and transient-error retry.
pub struct ContractReader {
    http: Arc<HttpClient>,
    contract_address: String,
    call_timeout: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ContractReader {
    #[must_use]
    pub fn new(
        http: Arc<HttpClient>,
        contract_address: impl Into<String>,
        call_timeout: Duration,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            http,
            contract_address: contract_address.into(),
            call_timeout,
            retry_attempts,
            retry_delay,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn eth_call_once(&self, endpoint: &str, calldata: &str) -> Result<Bytes, UpstreamError> {
        let params = json!([{ "to": self.contract_address, "data": calldata }, "latest"]);

        let result = with_timeout(
            self.call_timeout,
            self.http.call(endpoint, "eth_call", &params, self.call_timeout),
        )
        .await?;

        let raw = result.as_str().ok_or_else(|| {
            UpstreamError::InvalidResponse("eth_call result is not a string".into())
        })?;
        Bytes::from_str(raw)
            .map_err(|e| UpstreamError::InvalidResponse(format!("eth_call result is not hex: {e}")))
    }

    async fn eth_call(
        &self,
        endpoint: &str,
        name: &'static str,
        calldata: Vec<u8>,
    ) -> Result<Bytes, UpstreamError> {
        if self.contract_address.is_empty() {
            return Err(UpstreamError::NotConfigured);
        }

        let calldata = hex::encode_prefixed(calldata);
        let started = Instant::now();

        let result = with_retry(self.retry_attempts, self.retry_delay, || {
            self.eth_call_once(endpoint, &calldata)
        })
        .await;

        if let Some(metrics) = &self.metrics {
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            metrics.record_upstream_call(name, result.is_ok(), elapsed_ms);
            if let Err(e) = &result {
                metrics.record_upstream_error(name, e.kind());
            }
        }

        result
    }
}

#[async_trait]
impl MarketReader for ContractReader {
    async fn market_count(&self, endpoint: &str) -> Result<u64, UpstreamError> {
        let calldata = SolCall::abi_encode(&marketCountCall {});
        let data = self.eth_call(endpoint, "marketCount", calldata).await?;
        map_market_count(&data)
    }

    async fn market(&self, endpoint: &str, id: u64) -> Result<MarketRecord, UpstreamError> {
        let call = getMarketCall { marketId: U256::from(id) };
        let data = self.eth_call(endpoint, "getMarket", SolCall::abi_encode(&call)).await?;
        map_market(&data)
    }

    async fn market_basics(
        &self,
        endpoint: &str,
        id: u64,
    ) -> Result<MarketBasics, UpstreamError> {
        let call = getMarketBasicsCall { marketId: U256::from(id) };
        let data = self.eth_call(endpoint, "getMarketBasics", SolCall::abi_encode(&call)).await?;
        map_market_basics(&data)
    }

    async fn market_admin(&self, endpoint: &str, id: u64) -> Result<MarketAdmin, UpstreamError> {
        let call = getMarketAdminCall { marketId: U256::from(id) };
        let data = self.eth_call(endpoint, "getMarketAdmin", SolCall::abi_encode(&call)).await?;
        map_market_admin(&data)
    }
}
