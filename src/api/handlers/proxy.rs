//! Proxy pool handlers

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::server::AppState;
use crate::error::VeilError;

const DEFAULT_PROBE_WORKERS: usize = 10;

/// Query parameters for probing the whole pool
#[derive(Debug, Deserialize, Default)]
pub struct TestAllQuery {
    pub workers: Option<usize>,
}

/// Replace the pool from a `host:port[:user[:pass]]` list
pub async fn load_proxies(State(state): State<AppState>, body: String) -> impl IntoResponse {
    let count = state.service.load_proxies(&body);
    info!(count, "Loaded proxy list");
    Json(json!({ "count": count }))
}

pub async fn clear_proxies(State(state): State<AppState>) -> impl IntoResponse {
    state.service.clear_proxies();
    StatusCode::NO_CONTENT
}

pub async fn proxy_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.proxy_status())
}

/// Probe one random proxy
pub async fn test_random_proxy(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, VeilError> {
    let result = state.service.test_random_proxy().await?;
    Ok(Json(result))
}

/// Probe every loaded proxy
pub async fn test_all_proxies(
    State(state): State<AppState>,
    Query(query): Query<TestAllQuery>,
) -> Result<impl IntoResponse, VeilError> {
    let workers = query.workers.unwrap_or(DEFAULT_PROBE_WORKERS);
    if workers == 0 {
        return Err(VeilError::InvalidRequest(
            "workers must be at least 1".to_string(),
        ));
    }

    let results = state.service.test_all_proxies(workers).await;
    let healthy = results.iter().filter(|r| r.working).count();

    Ok(Json(json!({
        "healthy": healthy,
        "unhealthy": results.len() - healthy,
        "results": results,
    })))
}
