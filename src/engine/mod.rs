mod core;
mod types;

pub use self::core::CaptureEngine;
pub use types::{BuildOutcome, EngineState, EngineStatus, StopReport};
