//! HTTP gateway layer: Axum router, handlers, and app state.

pub mod auth;
pub mod error;
pub mod handler;
mod redact;
pub mod state;

#[cfg(test)]
mod handler_tests;

pub use error::GatewayError;
pub use state::AppState;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the full Axum router.
///
/// Request-size enforcement happens inside the handlers themselves (§6: "enforced
/// via `Content-Length`"), each checked against `state.max_request_size_bytes`
/// before the body is parsed, so a rejection renders the standard JSON error
/// envelope rather than Axum's default plaintext 413. Axum's own body-limit layer
/// is disabled accordingly.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handler::chat_completions_handler))
        .route("/v1/completions", post(handler::completions_handler))
        .route("/v1/embeddings", post(handler::embeddings_handler))
        .route("/v1/cache/invalidate", post(handler::invalidate_handler))
        .route("/v1/models", get(handler::models_handler))
        .route("/health", get(handler::health_handler))
        .route("/health/detailed", get(handler::health_detailed_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
