use serde::Serialize;
use std::fmt;

/// Lifecycle of a supervised component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl ComponentState {
    /// Whether the component's task may still be running
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ComponentState::Starting | ComponentState::Running | ComponentState::Stopping
        )
    }
}

/// Why [`TimelapserApp::run`](super::TimelapserApp::run) began shutting down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or SIGTERM
    Signal(&'static str),
    /// Requested from inside the process
    UserRequest,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "received {}", name),
            ShutdownReason::UserRequest => f.write_str("shutdown requested"),
        }
    }
}
