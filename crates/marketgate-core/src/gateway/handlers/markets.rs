use std::{sync::Arc, time::Duration};

use tracing::debug;

use crate::{
    gateway::{
        engine::{Placeholder, RouteSpec, SharedContext},
        errors::GatewayError,
        response::GatewayResponse,
    },
    middleware::{parse_page_query, PageQuery},
    types::MarketPage,
    upstream::fetch_all,
};

use super::{fetch_view, to_body};

const ROUTE: &str = "markets";

/// Handler for `GET /api/markets?page=&limit=`.
pub struct MarketsHandler {
    ctx: Arc<SharedContext>,
}

impl MarketsHandler {
    #[must_use]
    pub fn new(ctx: Arc<SharedContext>) -> Self {
        Self { ctx }
    }

    pub async fn handle(
        &self,
        page: Option<&str>,
        limit: Option<&str>,
        client: &str,
    ) -> GatewayResponse {
        let query = match parse_page_query(page, limit, &self.ctx.config.markets) {
            Ok(query) => query,
            Err(e) => return self.ctx.reject(ROUTE, e),
        };

        let spec = RouteSpec {
            route: ROUTE,
            key: query.cache_key(),
            ttl: Duration::from_secs(self.ctx.config.cache.page_ttl_seconds),
            negative_id: None,
            placeholder: Placeholder::Body(serde_json::json!({ "items": [], "total": 0 })),
        };

        self.ctx
            .serve(spec, client, move |ctx, endpoint| async move {
                fetch_page(&ctx, &endpoint, query).await
            })
            .await
    }
}

/// Reads the ids of one page in ascending order with bounded fan-out.
///
/// Items that fail are skipped; a page where every item failed is an error.
async fn fetch_page(
    ctx: &SharedContext,
    endpoint: &str,
    query: PageQuery,
) -> Result<serde_json::Value, GatewayError> {
    let total = ctx.market_count(endpoint).await?;
    let ids: Vec<u64> = query.id_range(total).collect();

    let with_basics = ctx.config.markets.include_basics;
    let outcome = fetch_all(&ids, ctx.config.rpc.batch_concurrency, |id| {
        fetch_view(ctx, endpoint, id, with_basics, false)
    })
    .await;

    if outcome.all_failed() {
        return Err(outcome
            .last_error
            .map_or_else(|| GatewayError::UpstreamUnavailable("batch failed".into()), Into::into));
    }
    if outcome.failed > 0 {
        debug!(page = query.page, failed = outcome.failed, "page served with skipped items");
    }

    let items = outcome.items.into_iter().map(|(_, view)| view).collect();
    to_body(&MarketPage { items, total })
}
