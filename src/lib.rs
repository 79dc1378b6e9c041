pub mod app;
pub mod camera;
pub mod config;
#[cfg(feature = "control")]
pub mod control;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame;
pub mod telemetry;
pub mod video;

pub use app::{ComponentState, ShutdownReason, TimelapserApp};
pub use camera::{CameraConnection, CameraConnector, FrameSource, FrameSourceStats};
pub use config::TimelapserConfig;
pub use engine::{BuildOutcome, CaptureEngine, EngineState, EngineStatus, StopReport};
pub use error::{Result, TimelapserError};
pub use events::{EventBus, TimelapseEvent, Trigger};
pub use frame::FrameData;
pub use telemetry::{MqttTelemetry, PrinterReport, TelemetrySnapshot, TelemetryState};
pub use video::{AssemblyOutcome, VideoAssembler};

#[cfg(feature = "control")]
pub use control::ControlServer;
