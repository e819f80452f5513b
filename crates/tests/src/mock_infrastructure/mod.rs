//! Mock Infrastructure for Testing the Marketgate gateway
//!
//! Reusable mocks for exercising upstream interactions without a real chain.
//!
//! ## Components
//!
//! - `RpcMockBuilder`: Wraps mockito to answer probes and ABI-encoded contract reads
//! - `MarketFixture`: Return data for `getMarket`
//! - Test helpers for wiring gateways to a mock endpoint
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{MarketFixture, RpcMockBuilder};
//!
//! let mut mock = RpcMockBuilder::new().await;
//! mock.mock_market_count(5, None).await;
//! mock.mock_market(2, &MarketFixture::open(2), Some(1)).await;
//! ```

pub mod rpc_mock;
pub mod test_helpers;

pub use rpc_mock::{
    calldata, MarketFixture, RpcMockBuilder, GET_MARKET, GET_MARKET_ADMIN, GET_MARKET_BASICS,
    MARKET_COUNT,
};
pub use test_helpers::*;
