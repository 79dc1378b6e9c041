mod channel;
mod mqtt;
mod report;
mod state;

pub use channel::{ValueChannel, ValueSubscription};
pub use mqtt::MqttTelemetry;
pub use report::{PrintStatus, PrinterReport};
pub use state::{TelemetrySnapshot, TelemetryState};
