use super::types::{BuildOutcome, EngineState, EngineStatus, StopReport};
use crate::camera::FrameSource;
use crate::config::CaptureConfig;
use crate::error::{Result, TimelapserError};
use crate::events::{EventBus, TimelapseEvent, Trigger};
use crate::telemetry::{TelemetryState, ValueSubscription};
use crate::video::{frame_file_name, resolve_output_path, AssemblyOutcome, VideoAssembler};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// How long `stop` waits for the capture task after cancelling it
const CAPTURE_STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Print-progress driven capture engine.
///
/// Cheap to clone; clones share one engine. A session starts explicitly or
/// when the printer reports layer 0, captures one frame per layer and stops
/// explicitly or after the job reports completion and the grace period
/// elapses. Stopping always assembles the video, removes the frames and
/// returns the engine to idle.
#[derive(Clone)]
pub struct CaptureEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: CaptureConfig,
    telemetry: Arc<TelemetryState>,
    frame_source: Arc<FrameSource>,
    assembler: VideoAssembler,
    event_bus: Arc<EventBus>,
    capturing: AtomicBool,
    frame_count: AtomicU32,
    state: watch::Sender<EngineState>,
    // Set once the printer reported completion for the running session
    job_completed: AtomicBool,
    // Held for the whole of start and stop, which serializes them
    session: tokio::sync::Mutex<Option<CaptureSession>>,
}

/// The running capture task of a session
struct CaptureSession {
    task: JoinHandle<()>,
    cancel: CancellationToken,
    job_name: Option<String>,
}

impl CaptureEngine {
    pub fn new(
        config: CaptureConfig,
        telemetry: Arc<TelemetryState>,
        frame_source: Arc<FrameSource>,
        assembler: VideoAssembler,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                telemetry,
                frame_source,
                assembler,
                event_bus,
                capturing: AtomicBool::new(false),
                frame_count: AtomicU32::new(0),
                state: watch::Sender::new(EngineState::Idle),
                job_completed: AtomicBool::new(false),
                session: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Start a capture session.
    ///
    /// Returns `Ok(false)` without changing anything when already capturing.
    pub async fn start(&self, trigger: Trigger) -> Result<bool> {
        let mut session = self.inner.session.lock().await;
        if session.is_some() {
            info!("Already capturing; ignoring start ({:?})", trigger);
            return Ok(false);
        }

        let frames_dir = self.inner.config.frames_path();
        let output_dir = self.inner.config.output_path();
        for dir in [&frames_dir, &output_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                TimelapserError::component(
                    "capture_engine".to_string(),
                    format!("Failed to create directory {}: {}", dir.display(), e),
                )
            })?;
        }

        let stale = clear_directory(&frames_dir).await;
        if stale > 0 {
            warn!(
                "Removed {} stale entries from {}",
                stale,
                frames_dir.display()
            );
        }

        self.inner.frame_source.start_preview().await;
        self.inner.frame_count.store(0, Ordering::Release);

        // Subscribed before the session is visible so no transition between
        // here and the first poll of the task is missed
        let layers = self.inner.telemetry.subscribe_layer();
        let totals = self.inner.telemetry.subscribe_total_layers();

        self.inner.capturing.store(true, Ordering::Release);
        self.inner.job_completed.store(false, Ordering::Release);
        self.inner.state.send_replace(EngineState::Capturing);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.clone().run_capture_loop(layers, totals, cancel.clone()));

        let job_name = self.inner.telemetry.job_name();
        *session = Some(CaptureSession {
            task,
            cancel,
            job_name: job_name.clone(),
        });

        self.inner
            .event_bus
            .publish(TimelapseEvent::CaptureStarted { job_name, trigger });
        Ok(true)
    }

    /// Stop the running session and build its video.
    ///
    /// Returns `None` without changing anything when idle. Never fails: build
    /// problems are reported in the returned [`BuildOutcome`].
    pub async fn stop(&self, trigger: Trigger) -> Option<StopReport> {
        let mut session_slot = self.inner.session.lock().await;
        let Some(session) = session_slot.take() else {
            info!("Not capturing; ignoring stop ({:?})", trigger);
            return None;
        };

        self.inner.state.send_replace(EngineState::Stopping);
        self.inner.capturing.store(false, Ordering::Release);

        // The capture task must be gone before the camera and the frames
        // directory are touched
        session.cancel.cancel();
        let mut task = session.task;
        match timeout(CAPTURE_STOP_TIMEOUT, &mut task).await {
            Ok(Ok(())) => debug!("Capture task completed"),
            Ok(Err(e)) => error!("Error waiting for capture task: {}", e),
            Err(_) => {
                warn!(
                    "Capture task did not complete within {:?}; aborting",
                    CAPTURE_STOP_TIMEOUT
                );
                task.abort();
                let _ = task.await;
            }
        }

        self.inner.frame_source.stop_preview().await;

        let frame_count = self.inner.frame_count.load(Ordering::Acquire);
        let job_name = session.job_name.or_else(|| self.inner.telemetry.job_name());
        let outcome = self.build_video(frame_count, job_name.as_deref()).await;

        let frames_dir = self.inner.config.frames_path();
        let removed = clear_directory(&frames_dir).await;
        debug!("Removed {} entries from {}", removed, frames_dir.display());

        self.inner.frame_count.store(0, Ordering::Release);
        self.inner.state.send_replace(EngineState::Idle);
        drop(session_slot);

        match &outcome {
            BuildOutcome::Built(path) => {
                self.inner
                    .event_bus
                    .publish(TimelapseEvent::VideoBuilt { path: path.clone() });
            }
            BuildOutcome::NoFrames => {
                self.inner.event_bus.publish(TimelapseEvent::VideoSkipped {
                    reason: "no frames captured".to_string(),
                });
            }
            BuildOutcome::Failed(message) => {
                self.inner.event_bus.publish(TimelapseEvent::VideoSkipped {
                    reason: message.clone(),
                });
            }
            BuildOutcome::NamingExhausted { base } => {
                self.inner.event_bus.publish(TimelapseEvent::VideoSkipped {
                    reason: format!("no free output name for {}", base.display()),
                });
            }
        }
        self.inner.event_bus.publish(TimelapseEvent::CaptureStopped {
            trigger,
            frame_count,
        });

        Some(StopReport {
            trigger,
            frame_count,
            outcome,
        })
    }

    /// Start a session whenever the printer reports layer 0 while idle.
    ///
    /// A layer 0 reported while the previous job is completing or stopping
    /// never reopens that session; the new session starts once the engine
    /// is back to idle.
    pub fn spawn_auto_start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let engine = self.clone();
        let mut layers = self.inner.telemetry.subscribe_layer();
        let mut states = self.inner.state.subscribe();

        tokio::spawn(async move {
            let mut pending_start = false;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = states.changed(), if pending_start => {
                        if changed.is_err() {
                            break;
                        }
                        match engine.state() {
                            EngineState::Idle => {
                                pending_start = false;
                                info!("Previous session stopped; starting capture for the new job");
                                engine.auto_start().await;
                            }
                            // Started by someone else in the meantime
                            EngineState::Capturing if !engine.is_job_completed() => {
                                pending_start = false;
                            }
                            _ => {}
                        }
                    }
                    layer = layers.recv() => match layer {
                        Some(0) => match engine.state() {
                            EngineState::Idle => {
                                info!("Printer reported layer 0; starting capture");
                                engine.auto_start().await;
                            }
                            EngineState::Stopping => {
                                info!("Layer 0 observed while stopping; starting once stopped");
                                let _ = states.borrow_and_update();
                                pending_start = true;
                            }
                            EngineState::Capturing if engine.is_job_completed() => {
                                info!("Layer 0 observed while completing; starting once stopped");
                                let _ = states.borrow_and_update();
                                pending_start = true;
                            }
                            state => debug!("Layer 0 observed while {:?}; not auto-starting", state),
                        },
                        Some(_) => {}
                        None => break,
                    },
                }
            }

            debug!("Auto-start watcher stopped");
        })
    }

    async fn auto_start(&self) {
        if let Err(e) = self.start(Trigger::JobStarted).await {
            error!("Failed to auto-start capture: {}", e);
        }
    }

    fn is_job_completed(&self) -> bool {
        self.inner.job_completed.load(Ordering::Acquire)
    }

    pub fn state(&self) -> EngineState {
        *self.inner.state.borrow()
    }

    pub fn is_capturing(&self) -> bool {
        self.inner.capturing.load(Ordering::Acquire)
    }

    /// Highest captured layer + 1
    pub fn frame_count(&self) -> u32 {
        self.inner.frame_count.load(Ordering::Acquire)
    }

    pub fn status(&self) -> EngineStatus {
        let telemetry = self.inner.telemetry.snapshot();
        EngineStatus {
            state: self.state(),
            capturing: self.is_capturing(),
            frame_count: self.frame_count(),
            job_name: telemetry.job_name,
            current_layer: telemetry.current_layer,
            total_layers: telemetry.total_layers,
            preview: self.inner.frame_source.stats(),
        }
    }

    async fn run_capture_loop(
        self,
        mut layers: ValueSubscription<u32>,
        mut totals: ValueSubscription<u32>,
        cancel: CancellationToken,
    ) {
        let mut captured = HashSet::new();

        loop {
            let (layer, total) = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(total) = totals.recv() => match self.inner.telemetry.current_layer() {
                    Some(layer) => (layer, total),
                    None => continue,
                },
                Some(layer) = layers.recv() => {
                    (layer, self.inner.telemetry.total_layers().unwrap_or(0))
                }
                else => break,
            };

            if !self.is_capturing() {
                break;
            }

            // A total of 0 means the job size is not known yet
            if total > 0 && layer >= total {
                self.finish_job(layer, total, &cancel).await;
                return;
            }

            if captured.contains(&layer) {
                trace!("Layer {} already captured", layer);
                continue;
            }

            let stored = tokio::select! {
                _ = cancel.cancelled() => break,
                stored = self.capture_layer(layer) => stored,
            };
            if stored {
                captured.insert(layer);
            }
        }

        debug!("Capture loop stopped");
    }

    /// Grace period, final frame, then stop. Cancellation skips the rest.
    async fn finish_job(&self, layer: u32, total: u32, cancel: &CancellationToken) {
        self.inner.job_completed.store(true, Ordering::Release);
        self.inner.event_bus.publish(TimelapseEvent::JobCompleted {
            layer,
            total_layers: total,
        });

        let grace = self.inner.config.grace_period();
        debug!("Waiting {:?} before the final frame", grace);
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Stop requested during grace period; skipping final frame");
                return;
            }
            _ = sleep(grace) => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = self.capture_layer(layer) => {}
        }

        // Stop joins this task, so it has to run elsewhere
        let engine = self.clone();
        tokio::spawn(async move {
            engine.stop(Trigger::JobCompleted).await;
        });
    }

    /// Capture and persist the frame for `layer`. Returns false if skipped.
    async fn capture_layer(&self, layer: u32) -> bool {
        let Some(frame) = self.inner.frame_source.capture_still().await else {
            self.inner
                .event_bus
                .publish(TimelapseEvent::LayerSkipped { layer });
            return false;
        };

        let path = self.inner.config.frames_path().join(frame_file_name(layer));
        if let Err(e) = tokio::fs::write(&path, frame.bytes()).await {
            warn!("Failed to write {}: {}", path.display(), e);
            self.inner
                .event_bus
                .publish(TimelapseEvent::LayerSkipped { layer });
            return false;
        }

        let frame_count = self
            .inner
            .frame_count
            .fetch_max(layer.saturating_add(1), Ordering::AcqRel)
            .max(layer.saturating_add(1));
        self.inner
            .event_bus
            .publish(TimelapseEvent::FrameCaptured { layer, frame_count });
        true
    }

    async fn build_video(&self, frame_count: u32, job_name: Option<&str>) -> BuildOutcome {
        if frame_count == 0 {
            return BuildOutcome::NoFrames;
        }

        let output = match self.output_path(job_name) {
            Ok(path) => path,
            Err(TimelapserError::NamingExhausted { base, attempts }) => {
                if self.inner.config.overwrite_when_exhausted {
                    warn!(
                        "No free output name after {} attempts; overwriting {}",
                        attempts,
                        base.display()
                    );
                    base
                } else {
                    error!(
                        "No free output name after {} attempts for {}",
                        attempts,
                        base.display()
                    );
                    return BuildOutcome::NamingExhausted { base };
                }
            }
            Err(e) => return BuildOutcome::Failed(e.to_string()),
        };

        let frames_dir = self.inner.config.frames_path();
        match self
            .inner
            .assembler
            .assemble(&frames_dir, frame_count, &output)
            .await
        {
            Ok(AssemblyOutcome::Built(path)) => BuildOutcome::Built(path),
            Ok(AssemblyOutcome::NoFrames) => BuildOutcome::NoFrames,
            Err(e) => {
                error!("Video build failed: {}", e);
                BuildOutcome::Failed(e.to_string())
            }
        }
    }

    fn output_path(&self, job_name: Option<&str>) -> Result<PathBuf> {
        resolve_output_path(
            &self.inner.config.output_path(),
            chrono::Local::now().date_naive(),
            job_name,
            self.inner.config.max_name_attempts,
        )
    }
}

/// Remove every entry of `dir`, returning how many were removed
async fn clear_directory(dir: &Path) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read {}: {}", dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to list {}: {}", dir.display(), e);
                break;
            }
        };

        let path = entry.path();
        let result = match entry.file_type().await {
            Ok(file_type) if file_type.is_dir() => tokio::fs::remove_dir_all(&path).await,
            _ => tokio::fs::remove_file(&path).await,
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }

    removed
}
