use super::orchestrator::{AUTO_START, CONTROL, ENGINE, TELEMETRY};
use super::*;
use crate::camera::mock::{MockCameraMode, MockConnector};
use crate::config::TimelapserConfig;
use crate::events::{TimelapseEvent, Trigger};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

struct TestApp {
    app: TimelapserApp,
    _frames: TempDir,
    _output: TempDir,
}

fn create_test_app() -> TestApp {
    let frames = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();

    let mut config = TimelapserConfig::default();
    // Nothing listens here; the telemetry task just keeps retrying
    config.printer.host = "127.0.0.1".to_string();
    config.printer.port = 1;
    config.printer.tls = false;
    config.printer.reconnect_delay_ms = 50;
    config.camera.grab_timeout_ms = 100;
    config.camera.reconnect_backoff_ms = 20;
    config.camera.still_timeout_ms = 200;
    config.capture.frames_dir = frames.path().display().to_string();
    config.capture.output_dir = output.path().display().to_string();
    config.capture.grace_period_secs = 0;
    config.control.enabled = false;
    config.video.encoder_command = vec!["true".to_string()];

    let connector = MockConnector::new(MockCameraMode::Healthy);
    let app = TimelapserApp::with_connector(config, Arc::new(connector));

    TestApp {
        app,
        _frames: frames,
        _output: output,
    }
}

#[tokio::test]
async fn test_initialize_registers_components() {
    let mut test = create_test_app();
    test.app.initialize().await.unwrap();

    let states = test.app.component_states().await;
    assert_eq!(states.get(TELEMETRY), Some(&ComponentState::Stopped));
    assert_eq!(states.get(ENGINE), Some(&ComponentState::Stopped));
    assert_eq!(states.get(AUTO_START), Some(&ComponentState::Stopped));
    assert!(!states.contains_key(CONTROL));
}

#[tokio::test]
async fn test_start_runs_components() {
    let mut test = create_test_app();
    test.app.initialize().await.unwrap();
    test.app.start().await.unwrap();

    assert_eq!(
        test.app.component_state(TELEMETRY).await,
        Some(ComponentState::Running)
    );
    assert_eq!(
        test.app.component_state(ENGINE).await,
        Some(ComponentState::Running)
    );
    assert_eq!(
        test.app.component_state(AUTO_START).await,
        Some(ComponentState::Running)
    );

    let exit_code = test.app.shutdown().await.unwrap();
    assert_eq!(exit_code, 0);
    assert_eq!(
        test.app.component_state(TELEMETRY).await,
        Some(ComponentState::Stopped)
    );
    assert_eq!(
        test.app.component_state(ENGINE).await,
        Some(ComponentState::Stopped)
    );
    assert!(!test
        .app
        .component_states()
        .await
        .values()
        .any(|state| state.is_active()));
}

#[tokio::test]
async fn test_shutdown_stops_active_capture() {
    let mut test = create_test_app();
    test.app.initialize().await.unwrap();
    test.app.start().await.unwrap();

    let mut events = test.app.event_bus().subscribe();
    let engine = test.app.engine();
    assert!(engine.start(Trigger::Manual).await.unwrap());
    assert!(engine.is_capturing());

    test.app.shutdown().await.unwrap();
    assert!(!engine.is_capturing());

    let stopped = timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(TimelapseEvent::CaptureStopped { trigger, .. }) = events.recv().await {
                return trigger;
            }
        }
    })
    .await
    .expect("capture stopped event");
    assert_eq!(stopped, Trigger::Shutdown);
}

#[tokio::test]
async fn test_requested_shutdown_ends_run() {
    let mut test = create_test_app();
    test.app.initialize().await.unwrap();
    test.app.start().await.unwrap();

    test.app.request_shutdown(ShutdownReason::UserRequest).await;

    let exit_code = timeout(Duration::from_secs(15), test.app.run())
        .await
        .expect("run returns after shutdown request")
        .unwrap();
    assert_eq!(exit_code, 0);
}

#[tokio::test]
async fn test_run_twice_is_rejected() {
    let mut test = create_test_app();
    test.app.initialize().await.unwrap();

    test.app.request_shutdown(ShutdownReason::UserRequest).await;
    assert_eq!(test.app.run().await.unwrap(), 0);
    assert!(test.app.run().await.is_err());
}
