//! RPC Mock Builder for market contract reads
//!
//! Wraps mockito to answer `eth_blockNumber`, `eth_getCode` and ABI-encoded `eth_call`s
//! for the market contract getters.

use alloy_primitives::{hex, keccak256, U256};
use alloy_sol_types::{Revert, SolError, SolValue};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

pub const MARKET_COUNT: &str = "marketCount()";
pub const GET_MARKET: &str = "getMarket(uint256)";
pub const GET_MARKET_BASICS: &str = "getMarketBasics(uint256)";
pub const GET_MARKET_ADMIN: &str = "getMarketAdmin(uint256)";

/// `0x`-prefixed calldata for `signature`, with `id` as the single `uint256` argument.
#[must_use]
pub fn calldata(signature: &str, id: Option<u64>) -> String {
    let mut data = keccak256(signature.as_bytes())[..4].to_vec();
    if let Some(id) = id {
        data.extend_from_slice(&U256::from(id).abi_encode());
    }
    hex::encode_prefixed(data)
}

/// Return data for one market.
#[derive(Debug, Clone)]
pub struct MarketFixture {
    pub question: String,
    pub yes_pool: u128,
    pub no_pool: u128,
    pub status: u8,
    pub outcome: bool,
    pub close_time: u64,
}

impl MarketFixture {
    /// An open market whose pools scale with `id`.
    #[must_use]
    pub fn open(id: u64) -> Self {
        Self {
            question: format!("Will market {id} resolve YES?"),
            yes_pool: u128::from(id) * 1_000,
            no_pool: u128::from(id) * 100,
            status: 0,
            outcome: false,
            close_time: 1_800_000_000 + id,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u8) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn encode(&self) -> String {
        hex::encode_prefixed(
            (
                self.question.clone(),
                U256::from(self.yes_pool),
                U256::from(self.no_pool),
                U256::from(self.status),
                self.outcome,
                U256::from(self.close_time),
            )
                .abi_encode_params(),
        )
    }
}

fn result_body(result: &Value) -> String {
    json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string()
}

fn method_matcher(method: &str) -> Matcher {
    Matcher::Regex(format!(r#""method"\s*:\s*"{method}""#))
}

fn eth_call_matcher(calldata: &str) -> Matcher {
    Matcher::AllOf(vec![
        method_matcher("eth_call"),
        Matcher::Regex(format!(r#""data"\s*:\s*"{calldata}""#)),
    ])
}

/// Builder for a mock JSON-RPC endpoint serving the market contract.
///
/// Mocks registered with an expected hit count are checked by [`RpcMockBuilder::verify`].
pub struct RpcMockBuilder {
    server: ServerGuard,
    mocks: Vec<Mock>,
    counted: Vec<Mock>,
}

impl RpcMockBuilder {
    pub async fn new() -> Self {
        Self { server: Server::new_async().await, mocks: Vec::new(), counted: Vec::new() }
    }

    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    fn keep(&mut self, mock: Mock, hits: Option<usize>) -> &mut Self {
        if hits.is_some() {
            self.counted.push(mock);
        } else {
            self.mocks.push(mock);
        }
        self
    }

    async fn respond(&mut self, matcher: Matcher, body: String, hits: Option<usize>) -> &mut Self {
        let mut mock = self
            .server
            .mock("POST", "/")
            .match_body(matcher)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body);
        if let Some(hits) = hits {
            mock = mock.expect(hits);
        }
        let mock = mock.create_async().await;
        self.keep(mock, hits)
    }

    /// Mocks `eth_blockNumber`, the liveness half of an endpoint probe.
    pub async fn mock_block_number(&mut self, block_number: u64) -> &mut Self {
        let body = result_body(&json!(format!("0x{block_number:x}")));
        self.respond(method_matcher("eth_blockNumber"), body, None).await
    }

    /// Mocks `eth_getCode`; `"0x"` means no contract is deployed.
    pub async fn mock_get_code(&mut self, code: &str) -> &mut Self {
        self.respond(method_matcher("eth_getCode"), result_body(&json!(code)), None).await
    }

    /// Mocks a healthy endpoint with contract code deployed.
    pub async fn mock_healthy(&mut self) -> &mut Self {
        self.mock_block_number(0x10).await;
        self.mock_get_code("0x6080604052").await
    }

    pub async fn mock_market_count(&mut self, count: u64, hits: Option<usize>) -> &mut Self {
        let result = hex::encode_prefixed(U256::from(count).abi_encode());
        let body = result_body(&json!(result));
        self.respond(eth_call_matcher(&calldata(MARKET_COUNT, None)), body, hits).await
    }

    pub async fn mock_market(
        &mut self,
        id: u64,
        market: &MarketFixture,
        hits: Option<usize>,
    ) -> &mut Self {
        let body = result_body(&json!(market.encode()));
        self.respond(eth_call_matcher(&calldata(GET_MARKET, Some(id))), body, hits).await
    }

    pub async fn mock_market_basics(
        &mut self,
        id: u64,
        description: &str,
        category: &str,
    ) -> &mut Self {
        let data = (format!("Market {id}"), description.to_string(), category.to_string())
            .abi_encode_params();
        let body = result_body(&json!(hex::encode_prefixed(data)));
        self.respond(eth_call_matcher(&calldata(GET_MARKET_BASICS, Some(id))), body, None).await
    }

    pub async fn mock_market_admin(&mut self, id: u64, paused: bool) -> &mut Self {
        let data = (paused, false, false).abi_encode_params();
        let body = result_body(&json!(hex::encode_prefixed(data)));
        self.respond(eth_call_matcher(&calldata(GET_MARKET_ADMIN, Some(id))), body, None).await
    }

    /// Mocks a contract revert with an ABI-encoded `Error(string)` in `data`.
    pub async fn mock_revert(
        &mut self,
        calldata: &str,
        reason: &str,
        hits: Option<usize>,
    ) -> &mut Self {
        let data = SolError::abi_encode(&Revert { reason: reason.to_string() });
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {
                "code": 3,
                "message": "execution reverted",
                "data": hex::encode_prefixed(data),
            }
        })
        .to_string();
        self.respond(eth_call_matcher(calldata), body, hits).await
    }

    /// Mocks a JSON-RPC error response for `method`.
    pub async fn mock_rpc_error(&mut self, method: &str, code: i32, message: &str) -> &mut Self {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": code, "message": message }
        })
        .to_string();
        self.respond(method_matcher(method), body, None).await
    }

    /// Every request answers `500`.
    pub async fn mock_server_error(&mut self) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;
        self.keep(mock, None)
    }

    /// Every request answers `503`, expected exactly `hits` times when given.
    pub async fn mock_unavailable(&mut self, hits: Option<usize>) -> &mut Self {
        let mut mock = self.server.mock("POST", "/").with_status(503).with_body("unavailable");
        if let Some(hits) = hits {
            mock = mock.expect(hits);
        }
        let mock = mock.create_async().await;
        self.keep(mock, hits)
    }

    /// Drops every registered mock; later requests get mockito's `501`.
    pub async fn reset(&mut self) {
        self.server.reset_async().await;
        self.mocks.clear();
        self.counted.clear();
    }

    /// Asserts the hit counts of every counted mock.
    pub async fn verify(&self) {
        for mock in &self.counted {
            mock.assert_async().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calldata_layout() {
        let data = calldata(GET_MARKET, Some(7));
        assert_eq!(data.len(), 2 + 8 + 64);
        assert!(data.ends_with("07"));

        assert_eq!(calldata(MARKET_COUNT, None).len(), 10);
    }

    #[test]
    fn test_fixture_encodes_open_market() {
        let encoded = MarketFixture::open(3).encode();
        assert!(encoded.starts_with("0x"));
        assert_eq!((encoded.len() - 2) % 64, 0);
    }
}
