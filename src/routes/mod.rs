//! Router assembly: HTTP endpoints for the exercise backend, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - REST-ish API under `/api/v1/...` (exercises, responses, chat, assets, enhance)
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::http_health))
        // Authoring
        .route(
            "/api/v1/exercises",
            post(http::http_create_exercise).put(http::http_save_exercise),
        )
        .route("/api/v1/exercises/:id", get(http::http_get_exercise))
        .route("/api/v1/exercises/:id/lock", post(http::http_lock_exercise))
        .route("/api/v1/exercises/:id/unlock", post(http::http_unlock_exercise))
        .route("/api/v1/exercises/:id/responses", post(http::http_assign_response))
        // Responding
        .route("/api/v1/responses", put(http::http_save_response))
        .route("/api/v1/responses/submit", post(http::http_submit_response))
        .route("/api/v1/responses/:id", get(http::http_get_response))
        .route("/api/v1/chat/turn", post(http::http_chat_turn))
        // Assets + text
        .route("/api/v1/assets", post(http::http_upload_asset))
        .route("/api/v1/assets/:id/describe", post(http::http_describe_asset))
        .route("/api/v1/enhance", post(http::http_enhance_text))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
