use super::types::{ComponentState, ShutdownReason};
use crate::camera::{default_connector, CameraConnector, FrameSource};
use crate::config::TimelapserConfig;
use crate::engine::CaptureEngine;
use crate::error::Result;
use crate::events::EventBus;
use crate::telemetry::TelemetryState;
use crate::video::VideoAssembler;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Component names used for lifecycle tracking
pub(super) const TELEMETRY: &str = "telemetry";
pub(super) const ENGINE: &str = "engine";
pub(super) const AUTO_START: &str = "auto_start";
pub(super) const CONTROL: &str = "control";

/// Main application coordinator that owns every component of the timelapser
pub struct TimelapserApp {
    pub(super) config: TimelapserConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) telemetry: Arc<TelemetryState>,
    pub(super) frame_source: Arc<FrameSource>,
    pub(super) engine: CaptureEngine,

    // Background tasks by component name
    pub(super) tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<BTreeMap<&'static str, ComponentState>>>,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl TimelapserApp {
    /// Create the application with the configured RTSP camera
    pub fn new(config: TimelapserConfig) -> Result<Self> {
        let connector = default_connector(&config.camera)?;
        Ok(Self::with_connector(config, connector))
    }

    /// Create the application with a specific camera connector
    pub fn with_connector(config: TimelapserConfig, connector: Arc<dyn CameraConnector>) -> Self {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let telemetry = Arc::new(TelemetryState::new());
        let frame_source = Arc::new(FrameSource::new(config.camera.clone(), connector));
        let assembler = VideoAssembler::new(config.video.clone());

        let engine = CaptureEngine::new(
            config.capture.clone(),
            Arc::clone(&telemetry),
            Arc::clone(&frame_source),
            assembler,
            Arc::clone(&event_bus),
        );

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        info!(
            "Timelapser created for printer {} and camera {}",
            config.printer.host,
            crate::camera::redact_url(&config.camera.rtsp_url)
        );

        Self {
            config,
            event_bus,
            telemetry,
            frame_source,
            engine,
            tasks: Mutex::new(Vec::new()),
            component_states: Arc::new(Mutex::new(BTreeMap::new())),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn engine(&self) -> CaptureEngine {
        self.engine.clone()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn telemetry(&self) -> Arc<TelemetryState> {
        Arc::clone(&self.telemetry)
    }

    pub fn config(&self) -> &TimelapserConfig {
        &self.config
    }

    pub(super) async fn set_component_state(&self, component: &'static str, state: ComponentState) {
        let previous = self.component_states.lock().await.insert(component, state);
        if previous != Some(state) {
            debug!("{} component: {:?} -> {:?}", component, previous, state);
        }
    }

    pub async fn component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().await.get(component).copied()
    }

    /// Every registered component, by name
    pub async fn component_states(&self) -> BTreeMap<&'static str, ComponentState> {
        self.component_states.lock().await.clone()
    }

    /// Ask a running [`run`](Self::run) loop to shut down
    pub async fn request_shutdown(&self, reason: ShutdownReason) {
        if let Some(sender) = self.shutdown_sender.lock().await.take() {
            let _ = sender.send(reason);
        }
    }
}
