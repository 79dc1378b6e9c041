use crate::error::CameraError;
use crate::frame::FrameData;
use async_trait::async_trait;

/// An open camera stream.
///
/// Implementations must tolerate being dropped mid-grab: a timed-out
/// still capture is abandoned without calling [`close`](Self::close).
#[async_trait]
pub trait CameraConnection: Send {
    /// Wait for the next frame of the stream
    async fn grab_frame(&mut self) -> Result<FrameData, CameraError>;

    /// Release the stream
    async fn close(&mut self);
}

/// Opens connections to a camera
#[async_trait]
pub trait CameraConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn CameraConnection>, CameraError>;

    /// Human-readable camera identity for logs
    fn describe(&self) -> String;
}

/// Connector used when no capture backend is compiled in
pub struct UnavailableConnector;

#[async_trait]
impl CameraConnector for UnavailableConnector {
    async fn connect(&self) -> Result<Box<dyn CameraConnection>, CameraError> {
        Err(CameraError::Unsupported)
    }

    fn describe(&self) -> String {
        "unavailable camera".to_string()
    }
}

/// Strip credentials from an RTSP URL for logging
pub(crate) fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}
