use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use shared::{
    error::{ApiError, ApiException},
    protocol::{PageQuery, PageResponse, SearchQuery, SearchResponse, SlackMessageResponse},
};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;
mod slack;
mod volumes;

#[cfg(test)]
#[path = "tests/support.rs"]
mod tests_support;

use api::{fetch_page_route, search_route, send_slack_message_route, status_for};
use app_state::AppState;
use config::load_settings;
use slack::SlackRelay;
use volumes::VolumesClient;

type HttpResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Default, Deserialize)]
struct SlackRelayRequest {
    #[serde(default)]
    text: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    if settings.slack_webhook_url.is_none() {
        info!("slack: no webhook configured; alert relay will fail");
    }
    let state = AppState {
        volumes: VolumesClient::new(settings.books_api_url.clone()),
        slack: SlackRelay::new(settings.slack_webhook_url.clone()),
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, books_api_url = %settings.books_api_url, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(search_route(), get(http_search))
        .route(fetch_page_route(), get(http_fetch_page))
        .route(send_slack_message_route(), post(http_send_slack_message))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn into_http_error(err: ApiException) -> (StatusCode, Json<ApiError>) {
    (status_for(err.code), Json(ApiError::from(err)))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_search(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SearchQuery>,
) -> HttpResult<SearchResponse> {
    api::search_books(&state, &q.q)
        .await
        .map(Json)
        .map_err(into_http_error)
}

async fn http_fetch_page(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PageQuery>,
) -> HttpResult<PageResponse> {
    api::fetch_page(&state, &q.q, q.start_index)
        .await
        .map(Json)
        .map_err(into_http_error)
}

async fn http_send_slack_message(
    State(state): State<Arc<AppState>>,
    body: Option<Json<SlackRelayRequest>>,
) -> HttpResult<SlackMessageResponse> {
    let Json(req) = body.unwrap_or_default();
    api::relay_slack_message(&state, req.text.as_deref())
        .await
        .map(Json)
        .map_err(into_http_error)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
