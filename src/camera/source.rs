use super::connector::{CameraConnection, CameraConnector};
use crate::config::CameraConfig;
use crate::frame::FrameData;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// How long `stop_preview` waits for the loop to wind down
const PREVIEW_STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Preview loop statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameSourceStats {
    pub running: bool,
    pub frames_grabbed: u64,
    pub reconnects: u64,
    pub has_latest_frame: bool,
}

/// Camera frame source with an always-fresh preview frame.
///
/// The preview loop is the only writer of the latest-frame slot. It stores a
/// complete [`FrameData`] per grab and readers clone it out under the lock,
/// so a reader never observes a frame being overwritten.
pub struct FrameSource {
    config: CameraConfig,
    connector: Arc<dyn CameraConnector>,
    latest_frame: Arc<RwLock<Option<FrameData>>>,
    is_running: Arc<AtomicBool>,
    frames_grabbed: Arc<AtomicU64>,
    reconnects: Arc<AtomicU64>,
    preview: tokio::sync::Mutex<Option<PreviewHandle>>,
}

struct PreviewHandle {
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// State moved into the preview task
struct PreviewLoop {
    connector: Arc<dyn CameraConnector>,
    latest_frame: Arc<RwLock<Option<FrameData>>>,
    frames_grabbed: Arc<AtomicU64>,
    reconnects: Arc<AtomicU64>,
    connect_timeout: Duration,
    grab_timeout: Duration,
    backoff: Duration,
}

impl FrameSource {
    pub fn new(config: CameraConfig, connector: Arc<dyn CameraConnector>) -> Self {
        Self {
            config,
            connector,
            latest_frame: Arc::new(RwLock::new(None)),
            is_running: Arc::new(AtomicBool::new(false)),
            frames_grabbed: Arc::new(AtomicU64::new(0)),
            reconnects: Arc::new(AtomicU64::new(0)),
            preview: tokio::sync::Mutex::new(None),
        }
    }

    /// Start the self-healing preview loop. No-op if already running.
    pub async fn start_preview(&self) {
        let mut preview = self.preview.lock().await;
        if preview.is_some() {
            debug!("Preview loop is already running");
            return;
        }

        let cancel = CancellationToken::new();
        let preview_loop = PreviewLoop {
            connector: Arc::clone(&self.connector),
            latest_frame: Arc::clone(&self.latest_frame),
            frames_grabbed: Arc::clone(&self.frames_grabbed),
            reconnects: Arc::clone(&self.reconnects),
            connect_timeout: self.config.io_timeout().max(self.config.grab_timeout()),
            grab_timeout: self.config.grab_timeout(),
            backoff: self.config.reconnect_backoff(),
        };

        let task = tokio::spawn(preview_loop.run(cancel.clone()));
        self.is_running.store(true, Ordering::Release);
        *preview = Some(PreviewHandle { task, cancel });

        info!("Preview loop started for {}", self.connector.describe());
    }

    /// Stop the preview loop and drop the latest frame
    pub async fn stop_preview(&self) {
        let handle = self.preview.lock().await.take();
        let Some(handle) = handle else {
            debug!("Preview loop is not running");
            return;
        };

        handle.cancel.cancel();
        match timeout(PREVIEW_STOP_TIMEOUT, handle.task).await {
            Ok(Ok(())) => debug!("Preview task completed"),
            Ok(Err(e)) => error!("Error waiting for preview task: {}", e),
            Err(_) => warn!("Preview task did not complete within {:?}", PREVIEW_STOP_TIMEOUT),
        }

        self.is_running.store(false, Ordering::Release);
        *self.latest_frame.write() = None;
        info!("Preview loop stopped");
    }

    /// Latest preview frame, if one is available
    pub fn latest_frame(&self) -> Option<FrameData> {
        self.latest_frame.read().clone()
    }

    /// Capture a still frame.
    ///
    /// Prefers the latest preview frame. Otherwise opens a short-lived
    /// connection bounded by the still timeout. Failures are logged and
    /// reported as `None`.
    pub async fn capture_still(&self) -> Option<FrameData> {
        if let Some(frame) = self.latest_frame() {
            trace!("Using preview frame {} for still capture", frame.id);
            return Some(frame);
        }

        debug!("No preview frame available; grabbing a still directly");
        let budget = self.config.still_timeout();
        let connector = Arc::clone(&self.connector);

        // Spawned so a connector that blocks its thread cannot hold the caller
        // past the budget. The attempt is aborted on timeout and when the
        // caller is cancelled.
        let mut attempt = AbortOnDrop(tokio::spawn(async move {
            let mut connection = connector.connect().await?;
            let frame = connection.grab_frame().await;
            connection.close().await;
            frame
        }));

        match timeout(budget, &mut attempt.0).await {
            Ok(Ok(Ok(frame))) => Some(frame),
            Ok(Ok(Err(e))) => {
                warn!("Still capture failed: {}", e);
                None
            }
            Ok(Err(e)) => {
                error!("Still capture task failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Still capture timed out after {:?}; skipping this frame", budget);
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> FrameSourceStats {
        FrameSourceStats {
            running: self.is_running(),
            frames_grabbed: self.frames_grabbed.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            has_latest_frame: self.latest_frame.read().is_some(),
        }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }
}

impl PreviewLoop {
    async fn run(self, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            let connection = tokio::select! {
                _ = cancel.cancelled() => break,
                result = timeout(self.connect_timeout, self.connector.connect()) => result,
            };

            match connection {
                Ok(Ok(mut connection)) => {
                    debug!("Preview connected to {}", self.connector.describe());
                    let cancelled = self.pump(connection.as_mut(), &cancel).await;
                    connection.close().await;
                    if cancelled {
                        break;
                    }
                }
                Ok(Err(e)) => warn!("Preview connection failed: {}", e),
                Err(_) => warn!(
                    "Preview connection timed out after {:?}",
                    self.connect_timeout
                ),
            }

            self.reconnects.fetch_add(1, Ordering::Relaxed);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.backoff) => {}
            }
        }

        debug!("Preview loop exited");
    }

    /// Grab frames until the connection fails or times out.
    /// Returns true when cancelled.
    async fn pump(&self, connection: &mut dyn CameraConnection, cancel: &CancellationToken) -> bool {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return true,
                result = timeout(self.grab_timeout, connection.grab_frame()) => match result {
                    Ok(Ok(frame)) => {
                        trace!("Preview frame {} ({} bytes)", frame.id, frame.len());
                        *self.latest_frame.write() = Some(frame);
                        self.frames_grabbed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Err(e)) => {
                        warn!("Preview grab failed: {}; restarting stream", e);
                        return false;
                    }
                    Err(_) => {
                        debug!(
                            "Preview grab timed out after {:?}; restarting stream",
                            self.grab_timeout
                        );
                        return false;
                    }
                }
            }
        }
    }
}
