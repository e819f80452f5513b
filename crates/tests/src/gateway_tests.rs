//! End-to-end request flows through `MarketGateway` against a mock endpoint.

use crate::mock_infrastructure::{
    calldata, test_config, MarketFixture, MockGateway, RpcMockBuilder, GET_MARKET,
};
use marketgate_core::config::RouteLimit;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_market_beyond_count_is_negative_cached() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_market_count(5, Some(1)).await;
    mock.mock_market(7, &MarketFixture::open(7), Some(0)).await;

    let gw = MockGateway::new(&mock.url(), test_config());

    let first = gw.gateway.market("7", "10.0.0.1").await;
    assert_eq!(first.status, 404);
    assert_eq!(first.body, json!({"error": "Market not found"}));

    // Past the count TTL but inside the negative TTL.
    gw.clock.advance(Duration::from_secs(6));
    let second = gw.gateway.market("7", "10.0.0.1").await;
    assert_eq!(second.status, 404);
    assert_eq!(second.body, json!({"error": "Market not found"}));

    mock.verify().await;
}

#[tokio::test]
async fn test_reverted_market_is_not_found() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_market_count(10, None).await;
    mock.mock_revert(&calldata(GET_MARKET, Some(3)), "Market does not exist", Some(1)).await;

    let gw = MockGateway::new(&mock.url(), test_config());

    assert_eq!(gw.gateway.market("3", "c").await.status, 404);
    assert_eq!(gw.gateway.market("3", "c").await.status, 404);
    mock.verify().await;
}

#[tokio::test]
async fn test_market_view_then_memory_hit() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_market_count(5, Some(1)).await;
    mock.mock_market(2, &MarketFixture::open(2), Some(1)).await;
    mock.mock_market_basics(2, "Quarterly growth above 2%", "economy").await;
    mock.mock_market_admin(2, false).await;

    let gw = MockGateway::new(&mock.url(), test_config());

    let first = gw.gateway.market("2", "c").await;
    assert_eq!(first.status, 200);
    assert_eq!(first.header("X-Cache"), Some("miss"));
    assert_eq!(first.header("Cache-Control"), Some("public, max-age=15"));
    assert_eq!(first.body["id"], 2);
    assert_eq!(first.body["yesPool"], "2000");
    assert_eq!(first.body["noPool"], "200");
    assert_eq!(first.body["category"], "economy");
    assert_eq!(first.body["admin"]["paused"], false);

    let second = gw.gateway.market("2", "c").await;
    assert_eq!(second.header("X-Cache"), Some("memory:fresh"));
    assert_eq!(second.body, first.body);

    mock.verify().await;
}

#[tokio::test]
async fn test_concurrent_requests_share_one_upstream_read() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_market_count(5, Some(1)).await;
    mock.mock_market(3, &MarketFixture::open(3), Some(1)).await;

    let gw = MockGateway::new(&mock.url(), test_config());

    let responses =
        futures::future::join_all((0..8).map(|_| gw.gateway.market("3", "c"))).await;

    for response in &responses {
        assert_eq!(response.status, 200);
        assert_eq!(response.body["question"], "Will market 3 resolve YES?");
    }
    mock.verify().await;
}

#[tokio::test]
async fn test_stale_page_served_when_upstream_fails() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_market_count(3, None).await;
    for id in 0..3 {
        mock.mock_market(id, &MarketFixture::open(id), None).await;
    }

    let gw = MockGateway::new(&mock.url(), test_config());

    let fresh = gw.gateway.markets(Some("1"), Some("50"), "c").await;
    assert_eq!(fresh.status, 200);
    assert_eq!(fresh.body["total"], 3);
    assert_eq!(fresh.body["items"].as_array().map(Vec::len), Some(3));

    mock.reset().await;
    mock.mock_unavailable(None).await;
    gw.clock.advance(Duration::from_secs(20));

    let degraded = gw.gateway.markets(Some("1"), Some("50"), "c").await;
    assert_eq!(degraded.status, 200);
    assert_eq!(degraded.body["degraded"], true);
    assert_eq!(degraded.body["items"], fresh.body["items"]);
    assert_eq!(degraded.header("X-Cache"), Some("fallback"));
}

#[tokio::test]
async fn test_top_markets_ranks_open_markets_by_pool() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_market_count(5, None).await;
    for id in 0..5 {
        let fixture = if id == 4 {
            MarketFixture::open(id).with_status(1)
        } else {
            MarketFixture::open(id)
        };
        mock.mock_market(id, &fixture, None).await;
    }

    let gw = MockGateway::new(&mock.url(), test_config());

    let top = gw.gateway.top_markets("c").await;
    assert_eq!(top.status, 200);
    let ids: Vec<u64> = top.body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![3, 2, 1]);
}

#[tokio::test]
async fn test_rate_limit_throttles_upstream_path() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_market_count(10, None).await;
    for id in 0..3 {
        mock.mock_market(id, &MarketFixture::open(id), None).await;
    }

    let mut config = test_config();
    config.rate_limit.enabled = true;
    let limit = RouteLimit { requests: 2, window_seconds: 30 };
    config.rate_limit.routes.insert("market".into(), limit);
    let gw = MockGateway::new(&mock.url(), config);

    assert_eq!(gw.gateway.market("0", "198.51.100.7").await.status, 200);
    assert_eq!(gw.gateway.market("1", "198.51.100.7").await.status, 200);

    let throttled = gw.gateway.market("2", "198.51.100.7").await;
    assert_eq!(throttled.status, 429);
    assert_eq!(throttled.body, json!({"error": "Too many requests"}));
    assert_eq!(throttled.header("Retry-After"), Some("30"));

    gw.clock.advance(Duration::from_secs(31));
    assert_eq!(gw.gateway.market("2", "198.51.100.7").await.status, 200);
}

#[tokio::test]
async fn test_cache_status_with_memory_backend() {
    let mock = RpcMockBuilder::new().await;
    let gw = MockGateway::new(&mock.url(), test_config());

    let status = gw.gateway.cache_status().await;
    assert_eq!(status.status, 200);
    assert_eq!(status.body, json!({"redisAvailable": false, "probeOk": false}));
}
