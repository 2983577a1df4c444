//! API route definitions

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::server::AppState;
use super::websocket;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Proxy pool
        .route(
            "/proxies",
            post(handlers::proxy::load_proxies).delete(handlers::proxy::clear_proxies),
        )
        .route("/proxies/status", get(handlers::proxy::proxy_status))
        .route("/proxies/test", post(handlers::proxy::test_random_proxy))
        .route("/proxies/test-all", post(handlers::proxy::test_all_proxies))
        // Verification
        .route("/verify", post(handlers::verify::run_verification))
        // WebSocket endpoints
        .route(
            "/ws/sessions/:session_id",
            get(websocket::sessions::session_ws),
        )
        .route("/ws/events", get(websocket::events::events_ws))
}
