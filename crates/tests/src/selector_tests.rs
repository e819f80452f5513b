//! Integration tests for endpoint probing and failover.

use crate::mock_infrastructure::{test_config, RpcMockBuilder};
use marketgate_core::{
    config::AppConfig,
    upstream::{EndpointResolver, EndpointSelector, HttpClient, ProbeReason},
    utils::{Clock, ManualClock},
};
use std::{sync::Arc, time::Duration};

fn selector(
    config: &AppConfig,
    candidates: Vec<String>,
    clock: &Arc<ManualClock>,
) -> EndpointSelector {
    let clock: Arc<dyn Clock> = clock.clone();
    EndpointSelector::new(
        &config.rpc,
        config.environment,
        candidates,
        Arc::new(HttpClient::new().expect("http client")),
        clock,
    )
}

#[tokio::test]
async fn test_failover_to_second_candidate_and_cache_selection() {
    let mut down = RpcMockBuilder::new().await;
    down.mock_unavailable(Some(1)).await;
    let mut healthy = RpcMockBuilder::new().await;
    healthy.mock_healthy().await;

    let clock = ManualClock::new();
    let selector = selector(&test_config(), vec![down.url(), healthy.url()], &clock);

    assert_eq!(selector.resolve().await, Some(healthy.url()));
    assert_eq!(selector.resolve().await, Some(healthy.url()));

    down.verify().await;
}

#[tokio::test]
async fn test_selection_expires_and_reprobes() {
    let mut down = RpcMockBuilder::new().await;
    down.mock_unavailable(Some(2)).await;
    let mut healthy = RpcMockBuilder::new().await;
    healthy.mock_healthy().await;

    let config = test_config();
    let clock = ManualClock::new();
    let selector = selector(&config, vec![down.url(), healthy.url()], &clock);

    assert_eq!(selector.resolve().await, Some(healthy.url()));
    clock.advance(Duration::from_millis(config.rpc.selection_cache_ms + 1));
    assert_eq!(selector.resolve().await, Some(healthy.url()));

    down.verify().await;
}

#[tokio::test]
async fn test_endpoint_without_contract_code_is_skipped() {
    let mut empty = RpcMockBuilder::new().await;
    empty.mock_block_number(0x20).await;
    empty.mock_get_code("0x").await;
    let mut deployed = RpcMockBuilder::new().await;
    deployed.mock_healthy().await;

    let clock = ManualClock::new();
    let selector = selector(&test_config(), vec![empty.url(), deployed.url()], &clock);

    let reports = selector.probe_all().await;
    assert_eq!(reports[0].reason, ProbeReason::ContractMissing);
    assert_eq!(reports[1].reason, ProbeReason::Ok);

    assert_eq!(selector.resolve().await, Some(deployed.url()));
}

#[tokio::test]
async fn test_non_http_candidates_are_skipped() {
    let mut healthy = RpcMockBuilder::new().await;
    healthy.mock_healthy().await;

    let clock = ManualClock::new();
    let selector =
        selector(&test_config(), vec!["wss://ws.example".to_string(), healthy.url()], &clock);

    assert_eq!(selector.probe("wss://ws.example").await.reason, ProbeReason::UnsupportedScheme);
    assert_eq!(selector.resolve().await, Some(healthy.url()));
}

#[tokio::test]
async fn test_all_unhealthy_fail_open_returns_first_candidate() {
    let mut first = RpcMockBuilder::new().await;
    first.mock_unavailable(None).await;
    let mut second = RpcMockBuilder::new().await;
    second.mock_rpc_error("eth_blockNumber", -32603, "internal error").await;

    let clock = ManualClock::new();
    let open = selector(&test_config(), vec![first.url(), second.url()], &clock);
    assert_eq!(open.resolve().await, Some(first.url()));

    let mut config = test_config();
    config.rpc.fail_open = false;
    let closed = selector(&config, vec![first.url(), second.url()], &clock);
    assert_eq!(closed.resolve().await, None);
}
