use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::api::{self, AppState};
use crate::config::VetterConfig;
use crate::hitl::ExpirySweeper;
use crate::service::ValidationService;

/// Configuration for the HTTP server.
pub struct ServerConfig {
    pub port: u16,
    pub project_dir: PathBuf,
    pub dev_mode: bool,
}

impl ServerConfig {
    pub fn from_config(config: &VetterConfig, project_dir: PathBuf) -> Self {
        Self {
            port: config.server.port,
            project_dir,
            dev_mode: config.server.dev_mode,
        }
    }
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router().with_state(state)
}

/// Serve the API until Ctrl+C, expiring stale approval requests in the
/// background.
pub async fn start_server(config: ServerConfig, vetter: VetterConfig) -> Result<()> {
    let ttl = vetter.hitl.ttl();
    let sweep_every = Duration::from_secs(vetter.hitl.sweep_interval_secs.max(1));
    let service = Arc::new(
        ValidationService::open(vetter, &config.project_dir)
            .context("Failed to initialize validation service")?,
    );
    let mut sweeper = ExpirySweeper::start(service.hitl(), ttl, sweep_every);

    let state = Arc::new(AppState { service });
    let mut app = build_router(state);
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if config.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "Server listening");
    println!("Vetter running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.stop().await;
    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
