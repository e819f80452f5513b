//! One handler per query shape. Each validates its input, describes the query as a
//! cacheable route and supplies the upstream computation; the shared pipeline in
//! [`super::engine`] does the rest.

pub mod market;
pub mod markets;
pub mod top;

pub use market::MarketHandler;
pub use markets::MarketsHandler;
pub use top::TopMarketsHandler;

use super::{engine::SharedContext, errors::GatewayError};
use crate::{types::MarketView, upstream::UpstreamError};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Reads one market plus its optional getters. The optional getters are best-effort.
pub(crate) async fn fetch_view(
    ctx: &SharedContext,
    endpoint: &str,
    id: u64,
    with_basics: bool,
    with_admin: bool,
) -> Result<MarketView, UpstreamError> {
    let record = ctx.reader.market(endpoint, id).await?;

    let basics = async {
        if !with_basics {
            return None;
        }
        ctx.reader
            .market_basics(endpoint, id)
            .await
            .map_err(|e| debug!(id, error = %e, "getMarketBasics failed, omitting"))
            .ok()
    };
    let admin = async {
        if !with_admin {
            return None;
        }
        ctx.reader
            .market_admin(endpoint, id)
            .await
            .map_err(|e| debug!(id, error = %e, "getMarketAdmin failed, omitting"))
            .ok()
    };
    let (basics, admin) = tokio::join!(basics, admin);

    Ok(record.into_view(id, basics, admin))
}

pub(crate) fn to_body<T: Serialize>(value: &T) -> Result<Value, GatewayError> {
    serde_json::to_value(value).map_err(|e| GatewayError::Internal(e.to_string()))
}
