mod connector;
#[cfg(feature = "camera")]
mod gst;
#[cfg(test)]
pub(crate) mod mock;
mod source;

pub(crate) use connector::redact_url;
pub use connector::{CameraConnection, CameraConnector, UnavailableConnector};
#[cfg(feature = "camera")]
pub use gst::GstRtspConnector;
pub use source::{FrameSource, FrameSourceStats};

use crate::config::CameraConfig;
use crate::error::Result;
use std::sync::Arc;

/// Connector for the configured RTSP camera.
///
/// Without the `camera` feature every connection attempt fails, which the
/// frame source treats like an unreachable camera.
pub fn default_connector(config: &CameraConfig) -> Result<Arc<dyn CameraConnector>> {
    #[cfg(feature = "camera")]
    {
        Ok(Arc::new(GstRtspConnector::new(config.clone())?))
    }

    #[cfg(not(feature = "camera"))]
    {
        tracing::warn!(
            "Camera support not compiled in; {} will never deliver frames",
            config.rtsp_url
        );
        Ok(Arc::new(UnavailableConnector))
    }
}
