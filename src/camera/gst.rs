use super::connector::{redact_url, CameraConnection, CameraConnector};
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::frame::FrameData;
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Samples buffered between the appsink callback and `grab_frame`
const SAMPLE_QUEUE_DEPTH: usize = 2;

/// GStreamer-based RTSP connector producing JPEG frames
pub struct GstRtspConnector {
    config: CameraConfig,
    frame_counter: Arc<AtomicU64>,
}

impl GstRtspConnector {
    pub fn new(config: CameraConfig) -> Result<Self> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        info!(
            "Initialized GStreamer RTSP connector for {} (transport {})",
            redact_url(&config.rtsp_url),
            config.transport
        );

        Ok(Self {
            config,
            frame_counter: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Build the GStreamer pipeline string for RTSP → JPEG capture
    pub fn build_pipeline_string(&self) -> String {
        let io_timeout_us = self.config.io_timeout().as_micros();

        format!(
            "rtspsrc location=\"{}\" protocols={} latency=0 tcp-timeout={} timeout={} ! \
             decodebin ! \
             videoconvert ! \
             jpegenc quality={} ! \
             appsink name=sink sync=false max-buffers=2 drop=true enable-last-sample=false emit-signals=false",
            self.config.rtsp_url,
            self.config.transport,
            io_timeout_us,
            io_timeout_us,
            self.config.jpeg_quality
        )
    }
}

#[async_trait]
impl CameraConnector for GstRtspConnector {
    async fn connect(&self) -> std::result::Result<Box<dyn CameraConnection>, CameraError> {
        let url = redact_url(&self.config.rtsp_url);
        let pipeline_desc = self.build_pipeline_string();
        debug!("Creating GStreamer pipeline for {}", url);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::Open {
                url: url.clone(),
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Open {
                url: url.clone(),
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Open {
                url: url.clone(),
                details: "Pipeline has no appsink".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::Open {
                url: url.clone(),
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        let (tx, rx) = mpsc::channel(SAMPLE_QUEUE_DEPTH);
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    match tx.try_send(sample) {
                        // Full queue: this sample is dropped, grab_frame skips to the newest queued one
                        Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {
                            Ok(gstreamer::FlowSuccess::Ok)
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            Err(gstreamer::FlowError::Flushing)
                        }
                    }
                })
                .build(),
        );

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::Open {
                url: url.clone(),
                details: format!("Failed to start pipeline: {}", e),
            })?;

        debug!("GStreamer pipeline playing for {}", url);

        Ok(Box::new(GstRtspConnection {
            pipeline,
            samples: rx,
            frame_counter: Arc::clone(&self.frame_counter),
        }))
    }

    fn describe(&self) -> String {
        redact_url(&self.config.rtsp_url)
    }
}

struct GstRtspConnection {
    pipeline: Pipeline,
    samples: mpsc::Receiver<gstreamer::Sample>,
    frame_counter: Arc<AtomicU64>,
}

impl GstRtspConnection {
    /// Error or EOS posted on the pipeline bus since the last grab
    fn pending_failure(&self) -> Option<CameraError> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[
            gstreamer::MessageType::Error,
            gstreamer::MessageType::Eos,
        ])?;

        match msg.view() {
            gstreamer::MessageView::Error(err) => Some(CameraError::Stream {
                details: format!("{} ({})", err.error(), err.debug().map(|d| d.to_string()).unwrap_or_default()),
            }),
            _ => Some(CameraError::EndOfStream),
        }
    }

    fn sample_to_frame(&self, sample: gstreamer::Sample) -> std::result::Result<FrameData, CameraError> {
        let buffer = sample.buffer().ok_or_else(|| CameraError::Stream {
            details: "No buffer in sample".to_string(),
        })?;

        let (width, height) = sample
            .caps()
            .and_then(|caps| caps.structure(0))
            .map(|s| {
                (
                    s.get::<i32>("width").unwrap_or(0).max(0) as u32,
                    s.get::<i32>("height").unwrap_or(0).max(0) as u32,
                )
            })
            .unwrap_or((0, 0));

        let map = buffer.map_readable().map_err(|e| CameraError::Stream {
            details: format!("Failed to map buffer: {}", e),
        })?;

        let frame_id = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        trace!(
            "Grabbed JPEG frame {} ({}x{}, {} bytes)",
            frame_id,
            width,
            height,
            map.len()
        );

        Ok(FrameData::new(
            frame_id,
            SystemTime::now(),
            map.as_slice().to_vec(),
            width,
            height,
        ))
    }
}

#[async_trait]
impl CameraConnection for GstRtspConnection {
    async fn grab_frame(&mut self) -> std::result::Result<FrameData, CameraError> {
        if let Some(failure) = self.pending_failure() {
            return Err(failure);
        }

        let mut sample = self.samples.recv().await.ok_or(CameraError::EndOfStream)?;
        while let Ok(newer) = self.samples.try_recv() {
            sample = newer;
        }
        self.sample_to_frame(sample)
    }

    async fn close(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

impl Drop for GstRtspConnection {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}
