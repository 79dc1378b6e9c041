use crate::events::Trigger;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, info};

use super::server::ControlState;

/// Start capturing; 409 if a session is already running
pub async fn start_handler(State(state): State<ControlState>) -> Response {
    info!("Start requested over HTTP");

    match state.engine.start(Trigger::Manual).await {
        Ok(true) => (StatusCode::OK, Json(state.engine.status())).into_response(),
        Ok(false) => (StatusCode::CONFLICT, Json(state.engine.status())).into_response(),
        Err(e) => {
            error!("Failed to start capture: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Stop capturing and build the video; 409 if idle
pub async fn stop_handler(State(state): State<ControlState>) -> Response {
    info!("Stop requested over HTTP");

    match state.engine.stop(Trigger::Manual).await {
        Some(report) => (StatusCode::OK, Json(report)).into_response(),
        None => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "not capturing" })),
        )
            .into_response(),
    }
}

pub async fn status_handler(State(state): State<ControlState>) -> impl IntoResponse {
    Json(state.engine.status())
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
