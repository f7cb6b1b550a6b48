//! Router assembly: JSON API, WebSocket upgrade, static frontend, CORS and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

const STATIC_DIR: &str = "./static";

/// Endpoints mounted under `/api/v1`.
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(http::http_health))
        .route("/problem", get(http::http_get_problem))
        .route("/session", post(http::http_post_session))
        .route("/session/:id/load", post(http::http_post_load))
        .route("/session/:id/history", get(http::http_get_history))
        .route("/grade", post(http::http_post_grade))
        .route("/hint", post(http::http_post_hint))
}

/// Full application: `/ws`, `/api/v1/...`, and the frontend from `./static`
/// (unknown paths fall back to its `index.html`).
pub fn build_router(state: Arc<AppState>) -> Router {
    let frontend = ServeDir::new(STATIC_DIR)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{STATIC_DIR}/index.html")));

    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(trace)
        .fallback_service(frontend)
}
