use crate::{
    config::ControlConfig,
    engine::CaptureEngine,
    error::{Result, TimelapserError},
};
use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::handlers::{health_handler, start_handler, status_handler, stop_handler};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ControlState {
    pub(crate) engine: CaptureEngine,
}

/// HTTP start/stop/status surface over one capture engine
pub struct ControlServer {
    pub(crate) config: ControlConfig,
    pub(crate) engine: CaptureEngine,
}

impl ControlServer {
    pub fn new(config: ControlConfig, engine: CaptureEngine) -> Self {
        Self { config, engine }
    }

    /// Routes, without binding a listener
    pub fn router(&self) -> Router {
        let state = ControlState {
            engine: self.engine.clone(),
        };

        Router::new()
            .route("/start", post(start_handler))
            .route("/stop", post(stop_handler))
            .route("/status", get(status_handler).post(status_handler))
            .route("/health", get(health_handler))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Serve until `cancel` fires
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let app = self.router();
        let addr = format!("{}:{}", self.config.ip, self.config.port);

        info!("Starting control server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            TimelapserError::component(
                "control_server".to_string(),
                format!("Failed to bind {}: {}", addr, e),
            )
        })?;

        info!("Control server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| {
                TimelapserError::component("control_server".to_string(), format!("Server error: {}", e))
            })?;

        info!("Control server stopped");
        Ok(())
    }
}
