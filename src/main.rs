//! Veil - Entry Point
//!
//! Loads configuration, builds the shared pool and event router, and serves
//! the API until Ctrl+C or SIGTERM.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use veil::api::ApiServer;
use veil::config::{Config, LogConfig};
use veil::events::SessionRouter;
use veil::proxy::{HealthProber, ProxyPool};
use veil::service::VerificationService;
use veil::workflow::ReachabilityWorkflow;

#[tokio::main]
async fn main() -> veil::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log);

    info!("Starting Veil");

    let pool = Arc::new(ProxyPool::new());
    let router = SessionRouter::new(config.events.buffer_size);
    let prober = HealthProber::new(config.probe.clone());
    let workflow = Arc::new(ReachabilityWorkflow::new(config.workflow.timeout));
    let service = Arc::new(VerificationService::new(pool, router, prober, workflow));

    if let Some(path) = &config.pool.proxy_file {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            error!("Failed to read proxy file {}: {}", path.display(), e);
            e
        })?;
        let count = service.load_proxies(&text);
        info!("Loaded {} proxies from {}", count, path.display());
    } else {
        info!("No PROXY_FILE set, starting with an empty pool");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let api_server = ApiServer::new(config.api.clone(), service.clone());
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(shutdown_rx).await {
            error!("API server error: {}", e);
        }
    });

    info!("API listening on {}", config.api_addr());

    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = api_task.await;

    info!("Veil stopped");
    Ok(())
}

/// `RUST_LOG` wins over `LOG_LEVEL`; `LOG_FORMAT=json` switches to JSON lines
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("veil={},tower_http=debug", log.level).into());

    if log.is_json() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
