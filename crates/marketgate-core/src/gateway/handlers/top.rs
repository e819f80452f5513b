use std::{cmp::Reverse, sync::Arc, time::Duration};

use alloy_primitives::U256;
use serde_json::json;

use crate::{
    gateway::{
        engine::{Placeholder, RouteSpec, SharedContext},
        errors::GatewayError,
        response::GatewayResponse,
    },
    types::TopMarkets,
    upstream::{fetch_all, MarketRecord},
};

use super::to_body;

const ROUTE: &str = "top-markets";
const CACHE_KEY: &str = "top-markets";

/// Handler for `GET /api/top-markets`.
pub struct TopMarketsHandler {
    ctx: Arc<SharedContext>,
}

impl TopMarketsHandler {
    #[must_use]
    pub fn new(ctx: Arc<SharedContext>) -> Self {
        Self { ctx }
    }

    pub async fn handle(&self, client: &str) -> GatewayResponse {
        let spec = RouteSpec {
            route: ROUTE,
            key: CACHE_KEY.to_string(),
            ttl: Duration::from_secs(self.ctx.config.cache.top_ttl_seconds),
            negative_id: None,
            placeholder: Placeholder::Body(json!({ "items": [] })),
        };

        self.ctx
            .serve(spec, client, |ctx, endpoint| async move { fetch_top(&ctx, &endpoint).await })
            .await
    }
}

/// Open markets with a non-empty pool, largest total pool first, ties by lower id.
pub(crate) fn rank_open_markets(
    records: Vec<(u64, MarketRecord)>,
    top_n: usize,
) -> Vec<(u64, MarketRecord)> {
    let mut ranked: Vec<(U256, u64, MarketRecord)> = records
        .into_iter()
        .filter_map(|(id, record)| {
            let total = record.yes_pool.saturating_add(record.no_pool);
            (record.status == 0 && !total.is_zero()).then_some((total, id, record))
        })
        .collect();

    ranked.sort_by_key(|(total, id, _)| (Reverse(*total), *id));
    ranked.truncate(top_n);
    ranked.into_iter().map(|(_, id, record)| (id, record)).collect()
}

/// Scans the most recent markets and keeps the top N by total pool.
async fn fetch_top(ctx: &SharedContext, endpoint: &str) -> Result<serde_json::Value, GatewayError> {
    let count = ctx.market_count(endpoint).await?;
    let scan_from = count.saturating_sub(ctx.config.markets.top_scan_limit);
    let ids: Vec<u64> = (scan_from..count).collect();

    let outcome = fetch_all(&ids, ctx.config.rpc.batch_concurrency, |id| {
        ctx.reader.market(endpoint, id)
    })
    .await;

    if outcome.all_failed() {
        return Err(outcome
            .last_error
            .map_or_else(|| GatewayError::UpstreamUnavailable("scan failed".into()), Into::into));
    }

    let items = rank_open_markets(outcome.items, ctx.config.markets.top_n)
        .into_iter()
        .map(|(id, record)| record.into_view(id, None, None))
        .collect();

    to_body(&TopMarkets { items })
}
