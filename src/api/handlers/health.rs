//! Health check endpoint

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::api::server::AppState;

/// Liveness plus a short summary of shared state
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.service.proxy_status();

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "veil",
            "uptimeSecs": state.started_at.elapsed().as_secs(),
            "proxies": pool,
            "sessions": state.service.router().session_count(),
        })),
    )
}
