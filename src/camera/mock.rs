use super::connector::{CameraConnection, CameraConnector};
use crate::error::CameraError;
use crate::frame::FrameData;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Interval between frames of a healthy mock stream
const MOCK_FRAME_INTERVAL: Duration = Duration::from_millis(10);

/// Behaviour of the mock camera, switchable while connections are open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCameraMode {
    /// Connects and streams frames
    Healthy,
    /// Connect never completes
    Unreachable,
    /// Connect fails immediately
    FailingConnect,
    /// Connects, but grabs never complete
    Stalling,
}

/// Mock camera for testing without an RTSP stream
#[derive(Clone)]
pub struct MockConnector {
    mode: Arc<Mutex<MockCameraMode>>,
    connects: Arc<AtomicUsize>,
    frame_counter: Arc<AtomicU64>,
}

impl MockConnector {
    pub fn new(mode: MockCameraMode) -> Self {
        Self {
            mode: Arc::new(Mutex::new(mode)),
            connects: Arc::new(AtomicUsize::new(0)),
            frame_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_mode(&self, mode: MockCameraMode) {
        *self.mode.lock() = mode;
    }

    /// Number of connection attempts so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn mode(&self) -> MockCameraMode {
        *self.mode.lock()
    }
}

#[async_trait]
impl CameraConnector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn CameraConnection>, CameraError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        match self.mode() {
            MockCameraMode::Unreachable => std::future::pending().await,
            MockCameraMode::FailingConnect => Err(CameraError::Open {
                url: self.describe(),
                details: "connection refused".to_string(),
            }),
            MockCameraMode::Healthy | MockCameraMode::Stalling => Ok(Box::new(MockConnection {
                connector: self.clone(),
            })),
        }
    }

    fn describe(&self) -> String {
        "rtsp://mock-camera/stream".to_string()
    }
}

struct MockConnection {
    connector: MockConnector,
}

#[async_trait]
impl CameraConnection for MockConnection {
    async fn grab_frame(&mut self) -> Result<FrameData, CameraError> {
        match self.connector.mode() {
            MockCameraMode::Healthy => {
                tokio::time::sleep(MOCK_FRAME_INTERVAL).await;
                let id = self.connector.frame_counter.fetch_add(1, Ordering::SeqCst);
                Ok(mock_frame(id))
            }
            MockCameraMode::FailingConnect => Err(CameraError::EndOfStream),
            MockCameraMode::Unreachable | MockCameraMode::Stalling => {
                std::future::pending().await
            }
        }
    }

    async fn close(&mut self) {}
}

/// Small JPEG-framed payload tagged with the frame id
pub fn mock_frame(id: u64) -> FrameData {
    let mut data = vec![0xFF, 0xD8];
    data.extend_from_slice(&id.to_be_bytes());
    data.extend_from_slice(&[0xFF, 0xD9]);
    FrameData::new(id, SystemTime::now(), data, 64, 48)
}
