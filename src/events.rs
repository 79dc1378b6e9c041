use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// What caused a capture session to start or stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Explicit start/stop request
    Manual,
    /// Printer reported layer 0 while idle
    JobStarted,
    /// Printer reported the last layer and the grace period elapsed
    JobCompleted,
    /// Process shutdown
    Shutdown,
}

/// Events published by the capture engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelapseEvent {
    /// The engine entered the capturing state
    CaptureStarted {
        job_name: Option<String>,
        trigger: Trigger,
    },
    /// A frame was persisted for a layer
    FrameCaptured { layer: u32, frame_count: u32 },
    /// No frame was available for a layer
    LayerSkipped { layer: u32 },
    /// The printer reported completion; the grace period is running
    JobCompleted { layer: u32, total_layers: u32 },
    /// The final video was written
    VideoBuilt { path: PathBuf },
    /// No video was produced for the session
    VideoSkipped { reason: String },
    /// The engine returned to idle
    CaptureStopped { trigger: Trigger, frame_count: u32 },
}

impl TimelapseEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            TimelapseEvent::CaptureStarted { job_name, trigger } => format!(
                "Capture started for {} ({:?})",
                job_name.as_deref().unwrap_or("unknown job"),
                trigger
            ),
            TimelapseEvent::FrameCaptured { layer, frame_count } => {
                format!("Frame captured for layer {} ({} frames)", layer, frame_count)
            }
            TimelapseEvent::LayerSkipped { layer } => format!("Layer {} skipped", layer),
            TimelapseEvent::JobCompleted {
                layer,
                total_layers,
            } => format!("Job completed at layer {}/{}", layer, total_layers),
            TimelapseEvent::VideoBuilt { path } => format!("Video built: {}", path.display()),
            TimelapseEvent::VideoSkipped { reason } => format!("Video skipped: {}", reason),
            TimelapseEvent::CaptureStopped {
                trigger,
                frame_count,
            } => format!("Capture stopped ({:?}, {} frames)", trigger, frame_count),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            TimelapseEvent::CaptureStarted { .. } => "capture_started",
            TimelapseEvent::FrameCaptured { .. } => "frame_captured",
            TimelapseEvent::LayerSkipped { .. } => "layer_skipped",
            TimelapseEvent::JobCompleted { .. } => "job_completed",
            TimelapseEvent::VideoBuilt { .. } => "video_built",
            TimelapseEvent::VideoSkipped { .. } => "video_skipped",
            TimelapseEvent::CaptureStopped { .. } => "capture_stopped",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<TimelapseEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<TimelapseEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of receivers; having none is not an error.
    pub fn publish(&self, event: TimelapseEvent) -> usize {
        match &event {
            TimelapseEvent::CaptureStarted { .. }
            | TimelapseEvent::JobCompleted { .. }
            | TimelapseEvent::VideoBuilt { .. }
            | TimelapseEvent::CaptureStopped { .. } => info!("{}", event.description()),
            TimelapseEvent::LayerSkipped { .. } | TimelapseEvent::VideoSkipped { .. } => {
                warn!("{}", event.description())
            }
            TimelapseEvent::FrameCaptured { .. } => debug!("{}", event.description()),
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
