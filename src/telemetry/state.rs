use super::channel::{ValueChannel, ValueSubscription};
use super::report::PrinterReport;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 64;

/// Point-in-time view of the telemetry fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub job_name: Option<String>,
    pub current_layer: Option<u32>,
    pub total_layers: Option<u32>,
}

/// Live `(job name, current layer, total layers)` view of the printer.
///
/// Each field keeps its last known value: a report that omits a field leaves
/// it untouched. The telemetry decoding path is the only writer.
pub struct TelemetryState {
    job_name: ValueChannel<String>,
    layer: ValueChannel<u32>,
    total_layers: ValueChannel<u32>,
    messages_applied: AtomicU64,
    messages_rejected: AtomicU64,
}

impl TelemetryState {
    pub fn new() -> Self {
        Self {
            job_name: ValueChannel::new(CHANNEL_CAPACITY),
            layer: ValueChannel::new(CHANNEL_CAPACITY),
            total_layers: ValueChannel::new(CHANNEL_CAPACITY),
            messages_applied: AtomicU64::new(0),
            messages_rejected: AtomicU64::new(0),
        }
    }

    /// Decode a raw report payload and apply it.
    ///
    /// Malformed payloads are logged and dropped; this never fails.
    pub fn apply(&self, payload: &str) {
        match PrinterReport::parse(payload) {
            Ok(report) => self.apply_report(report),
            Err(e) => {
                self.messages_rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping telemetry message: {}", e);
            }
        }
    }

    /// Apply an already decoded report
    pub fn apply_report(&self, report: PrinterReport) {
        self.messages_applied.fetch_add(1, Ordering::Relaxed);

        let Some(print) = report.print else {
            debug!("Telemetry message without print section");
            return;
        };

        if let Some(name) = print.subtask_name {
            if self.job_name.publish(name.clone()) {
                info!("Printer reported print file: {}", name);
            }
        }

        // Total before layer, so a layer subscriber reading total_layers()
        // sees the value carried by the same report.
        if let Some(total) = print.total_layer_num {
            if self.total_layers.publish(total) {
                info!("Printer reported total layers: {}", total);
            }
        }

        if let Some(layer) = print.layer_num {
            if self.layer.publish(layer) {
                info!("Printer reported layer change: {}", layer);
            }
        }
    }

    pub fn job_name(&self) -> Option<String> {
        self.job_name.get()
    }

    pub fn current_layer(&self) -> Option<u32> {
        self.layer.get()
    }

    pub fn total_layers(&self) -> Option<u32> {
        self.total_layers.get()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            job_name: self.job_name(),
            current_layer: self.current_layer(),
            total_layers: self.total_layers(),
        }
    }

    pub fn subscribe_job_name(&self) -> ValueSubscription<String> {
        self.job_name.subscribe()
    }

    pub fn subscribe_layer(&self) -> ValueSubscription<u32> {
        self.layer.subscribe()
    }

    pub fn subscribe_total_layers(&self) -> ValueSubscription<u32> {
        self.total_layers.subscribe()
    }

    /// (applied, rejected) message counters
    pub fn message_counts(&self) -> (u64, u64) {
        (
            self.messages_applied.load(Ordering::Relaxed),
            self.messages_rejected.load(Ordering::Relaxed),
        )
    }
}

impl Default for TelemetryState {
    fn default() -> Self {
        Self::new()
    }
}
