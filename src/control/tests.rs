use super::*;
use crate::camera::mock::{MockCameraMode, MockConnector};
use crate::camera::FrameSource;
use crate::config::{CaptureConfig, TimelapserConfig};
use crate::engine::CaptureEngine;
use crate::events::EventBus;
use crate::telemetry::TelemetryState;
use crate::video::VideoAssembler;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn create_test_server() -> (ControlServer, TempDir) {
    let defaults = TimelapserConfig::default();
    let dir = TempDir::new().unwrap();

    let capture = CaptureConfig {
        frames_dir: dir.path().join("frames").display().to_string(),
        output_dir: dir.path().join("output").display().to_string(),
        ..defaults.capture
    };
    let frame_source = Arc::new(FrameSource::new(
        defaults.camera,
        Arc::new(MockConnector::new(MockCameraMode::Healthy)),
    ));
    let engine = CaptureEngine::new(
        capture,
        Arc::new(TelemetryState::new()),
        frame_source,
        VideoAssembler::new(defaults.video),
        Arc::new(EventBus::new(16)),
    );

    (ControlServer::new(defaults.control, engine), dir)
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _dir) = create_test_server();
    let app = server.router();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn test_start_stop_round_trip() {
    let (server, _dir) = create_test_server();
    let app = server.router();

    let (status, body) = call(&app, "POST", "/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "capturing");
    assert_eq!(body["capturing"], true);

    let (status, _) = call(&app, "POST", "/start").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(&app, "GET", "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["capturing"], true);

    let (status, body) = call(&app, "POST", "/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trigger"], "manual");
    assert_eq!(body["frame_count"], 0);
    assert_eq!(body["outcome"]["result"], "no_frames");

    let (status, body) = call(&app, "POST", "/stop").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "not capturing");

    let (status, body) = call(&app, "POST", "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "idle");
}

#[tokio::test]
async fn test_unknown_route() {
    let (server, _dir) = create_test_server();
    let (status, _) = call(&server.router(), "GET", "/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
