use std::{sync::Arc, time::Duration};

use tracing::debug;

use crate::{
    gateway::{
        engine::{Placeholder, RouteSpec, SharedContext},
        errors::GatewayError,
        response::GatewayResponse,
    },
    middleware::parse_market_id,
};

use super::{fetch_view, to_body};

const ROUTE: &str = "market";

/// Handler for `GET /api/market/{id}`.
pub struct MarketHandler {
    ctx: Arc<SharedContext>,
}

impl MarketHandler {
    #[must_use]
    pub fn new(ctx: Arc<SharedContext>) -> Self {
        Self { ctx }
    }

    pub async fn handle(&self, raw_id: &str, client: &str) -> GatewayResponse {
        let id = match parse_market_id(raw_id, self.ctx.config.markets.max_market_id) {
            Ok(id) => id,
            Err(e) => return self.ctx.reject(ROUTE, e),
        };

        let spec = RouteSpec {
            route: ROUTE,
            key: format!("market:{id}"),
            ttl: Duration::from_secs(self.ctx.config.cache.market_ttl_seconds),
            negative_id: Some(id),
            placeholder: Placeholder::NotFound,
        };

        self.ctx
            .serve(spec, client, move |ctx, endpoint| async move {
                fetch_market(&ctx, &endpoint, id).await
            })
            .await
    }
}

/// Confirms the id against `marketCount()`, then reads the market.
///
/// Both "beyond the count" and a "does not exist" revert mark the id absent. A
/// successful read clears any earlier absence.
async fn fetch_market(
    ctx: &SharedContext,
    endpoint: &str,
    id: u64,
) -> Result<serde_json::Value, GatewayError> {
    let count = ctx.market_count(endpoint).await?;
    if id >= count {
        debug!(id, count, "market id beyond count");
        ctx.negative.mark_absent(id, ctx.negative_ttl());
        return Err(GatewayError::NotFound);
    }

    let markets = &ctx.config.markets;
    match fetch_view(ctx, endpoint, id, markets.include_basics, markets.include_admin).await {
        Ok(view) => {
            ctx.negative.clear(id);
            to_body(&view)
        }
        Err(e) if e.is_missing_entity() => {
            debug!(id, error = %e, "market reported missing by contract");
            ctx.negative.mark_absent(id, ctx.negative_ttl());
            Err(GatewayError::NotFound)
        }
        Err(e) => Err(e.into()),
    }
}
