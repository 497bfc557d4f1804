//! Router configuration.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;

use super::{admission, handlers, AppState};

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/nigeria-stocks", get(handlers::nigeria_stocks))
        .route("/nigeria-news", get(handlers::nigeria_news))
        .route("/chart-data/:asset_id", get(handlers::chart_data))
        .route("/chart-data", post(handlers::chart_data_post))
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/test-api/:endpoint", get(handlers::test_api))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            admission::admit,
        ))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Terminal handler: nothing internal leaks past a generic message.
fn handle_panic(_err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "Internal server error",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}
