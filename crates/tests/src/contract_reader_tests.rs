//! Integration tests for contract reads over JSON-RPC.

use crate::mock_infrastructure::{
    calldata, contract_reader, test_config, MarketFixture, RpcMockBuilder, GET_MARKET,
};
use alloy_primitives::U256;
use marketgate_core::upstream::{MarketReader, UpstreamError};

#[tokio::test]
async fn test_reads_and_decodes_market_getters() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_market_count(12, Some(1)).await;
    mock.mock_market(4, &MarketFixture::open(4), Some(1)).await;
    mock.mock_market_basics(4, "Resolves on the official count", "politics").await;
    mock.mock_market_admin(4, true).await;

    let reader = contract_reader(&test_config());
    let url = mock.url();

    assert_eq!(reader.market_count(&url).await.unwrap(), 12);

    let record = reader.market(&url, 4).await.unwrap();
    assert_eq!(record.question, "Will market 4 resolve YES?");
    assert_eq!(record.yes_pool, U256::from(4_000u64));
    assert_eq!(record.no_pool, U256::from(400u64));
    assert_eq!(record.close_time, U256::from(1_800_000_004u64));

    let basics = reader.market_basics(&url, 4).await.unwrap();
    assert_eq!(basics.category, "politics");

    let admin = reader.market_admin(&url, 4).await.unwrap();
    assert!(admin.paused);
    assert!(!admin.dispute_active);

    mock.verify().await;
}

#[tokio::test]
async fn test_revert_reason_marks_missing_market() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_revert(&calldata(GET_MARKET, Some(99)), "Market does not exist", Some(1)).await;

    let reader = contract_reader(&test_config());
    let err = reader.market(&mock.url(), 99).await.unwrap_err();

    assert!(err.is_missing_entity(), "unexpected error: {err}");
    assert!(err.to_string().contains("Market does not exist"));
    mock.verify().await;
}

#[tokio::test]
async fn test_server_error_is_retried_then_surfaced() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_unavailable(Some(3)).await;

    let mut config = test_config();
    config.rpc.retry_attempts = 3;
    let reader = contract_reader(&config);

    let err = reader.market_count(&mock.url()).await.unwrap_err();
    assert!(matches!(err, UpstreamError::HttpError(503, _)), "unexpected error: {err}");
    assert!(err.is_transient());
    mock.verify().await;
}

#[tokio::test]
async fn test_missing_contract_address_is_not_configured() {
    let mock = RpcMockBuilder::new().await;
    let mut config = test_config();
    config.rpc.contract_address = String::new();

    let err = contract_reader(&config).market_count(&mock.url()).await.unwrap_err();
    assert!(matches!(err, UpstreamError::NotConfigured));
}
