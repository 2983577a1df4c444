//! API server using Axum
//!
//! Exposes the verification service over REST and streams session events over
//! WebSockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::ApiServerConfig;
use crate::error::{Result, VeilError};
use crate::service::VerificationService;

use super::middleware::cors_layer;
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<VerificationService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<VerificationService>) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, service: Arc<VerificationService>) -> Self {
        Self {
            config,
            state: AppState::new(service),
        }
    }

    /// Router with CORS and request tracing applied
    pub fn build_router(&self) -> Router {
        let cors = cors_layer(&self.config.cors_origins);

        routes::create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` flips
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|_| {
                VeilError::InvalidConfig(format!(
                    "invalid API address {}:{}",
                    self.config.host, self.config.port
                ))
            })?;

        let router = self.build_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| VeilError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
