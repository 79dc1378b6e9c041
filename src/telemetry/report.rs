use crate::error::TelemetryError;
use serde::Deserialize;

/// Status report published by the printer on `device/<serial>/report`.
///
/// Only the fields the capture engine needs are decoded; everything else in
/// the payload is ignored.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PrinterReport {
    pub print: Option<PrintStatus>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct PrintStatus {
    /// Name of the running job (sliced file / plate name)
    pub subtask_name: Option<String>,
    /// Current layer index
    pub layer_num: Option<u32>,
    /// Total layer count of the job
    pub total_layer_num: Option<u32>,
}

impl PrinterReport {
    pub fn parse(payload: &str) -> Result<Self, TelemetryError> {
        Ok(serde_json::from_str(payload)?)
    }
}
