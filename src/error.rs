use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimelapserError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("No free output name for {base} after {attempts} attempts")]
    NamingExhausted { base: PathBuf, attempts: u32 },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Camera connection and grab failures
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera configuration error: {details}")]
    Configuration { details: String },

    #[error("Failed to open camera stream {url}: {details}")]
    Open { url: String, details: String },

    #[error("Camera stream error: {details}")]
    Stream { details: String },

    #[error("Camera stream ended")]
    EndOfStream,

    #[error("Camera support not compiled in")]
    Unsupported,
}

/// Telemetry decoding and transport failures
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Malformed telemetry payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Telemetry payload is not UTF-8")]
    Encoding,

    #[error("MQTT client error: {details}")]
    Client { details: String },
}

/// External encoder invocation failures
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Encoder command is empty")]
    EmptyCommand,

    #[error("Failed to launch encoder for {step}: {source}")]
    Spawn {
        step: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder exited with {status} during {step}")]
    Failed { step: &'static str, status: String },
}

impl TimelapserError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TimelapserError>;
