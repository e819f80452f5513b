use crate::middleware::{create_request_id_layers, ClientIdentity};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use marketgate_core::{config::AppConfig, gateway::GatewayResponse, gateway::MarketGateway};
use serde::Deserialize;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};
use tracing::debug;

pub type AppState = Arc<MarketGateway>;

/// Axum adapter for a [`GatewayResponse`].
pub struct HttpResponse(pub GatewayResponse);

impl IntoResponse for HttpResponse {
    fn into_response(self) -> Response {
        let GatewayResponse { status, body, headers, .. } = self.0;
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = (status, Json(body)).into_response();
        for (name, value) in headers {
            let (Ok(name), Ok(value)) =
                (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value))
            else {
                continue;
            };
            response.headers_mut().insert(name, value);
        }
        response
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    page: Option<String>,
    limit: Option<String>,
}

pub async fn handle_market(
    State(gateway): State<AppState>,
    client: ClientIdentity,
    Path(id): Path<String>,
) -> HttpResponse {
    debug!(market_id = %id, client = client.as_str(), "market request");
    HttpResponse(gateway.market(&id, client.as_str()).await)
}

pub async fn handle_markets(
    State(gateway): State<AppState>,
    client: ClientIdentity,
    Query(params): Query<PageParams>,
) -> HttpResponse {
    HttpResponse(
        gateway
            .markets(params.page.as_deref(), params.limit.as_deref(), client.as_str())
            .await,
    )
}

pub async fn handle_top_markets(
    State(gateway): State<AppState>,
    client: ClientIdentity,
) -> HttpResponse {
    HttpResponse(gateway.top_markets(client.as_str()).await)
}

pub async fn handle_cache_status(State(gateway): State<AppState>) -> HttpResponse {
    HttpResponse(gateway.cache_status().await)
}

#[allow(clippy::unused_async)]
pub async fn handle_metrics(State(gateway): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        gateway.metrics().render(),
    )
}

#[allow(clippy::unused_async)]
pub async fn handle_health(State(gateway): State<AppState>) -> impl IntoResponse {
    let health = serde_json::json!({
        "status": "ok",
        "environment": gateway.config().environment.as_str(),
        "rpcCandidates": gateway.rpc_candidates().len(),
        "distributedCache": gateway.backend_name(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (StatusCode::OK, Json(health))
}

/// Builds the public router.
///
/// `/health` and `/metrics` sit outside the concurrency limit so they answer even when
/// the API routes are saturated.
pub fn create_app(gateway: AppState, config: &AppConfig) -> Router {
    let (set_request_id, propagate_request_id) = create_request_id_layers();
    let (set_request_id_api, propagate_request_id_api) = create_request_id_layers();

    let public = Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(Arc::clone(&gateway))
        .layer(propagate_request_id)
        .layer(set_request_id);

    let api = Router::new()
        .route("/api/market/{id}", get(handle_market))
        .route("/api/markets", get(handle_markets))
        .route("/api/top-markets", get(handle_top_markets))
        .route("/api/cache-status", get(handle_cache_status))
        .with_state(gateway)
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests))
        .layer(CompressionLayer::new())
        .layer(propagate_request_id_api)
        .layer(set_request_id_api);

    public.merge(api)
}
