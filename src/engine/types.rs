use crate::camera::FrameSourceStats;
use crate::events::Trigger;
use serde::Serialize;
use std::path::PathBuf;

/// Capture engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Capturing,
    /// Stop in progress: tearing down and building the video
    Stopping,
}

/// Snapshot of the engine for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub capturing: bool,
    pub frame_count: u32,
    pub job_name: Option<String>,
    pub current_layer: Option<u32>,
    pub total_layers: Option<u32>,
    pub preview: FrameSourceStats,
}

/// What became of the video when a session stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum BuildOutcome {
    Built(PathBuf),
    NoFrames,
    Failed(String),
    /// Every candidate output name was taken
    NamingExhausted { base: PathBuf },
}

/// Summary returned by a stop that ended a session
#[derive(Debug, Clone, Serialize)]
pub struct StopReport {
    pub trigger: Trigger,
    pub frame_count: u32,
    pub outcome: BuildOutcome,
}
