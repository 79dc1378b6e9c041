use super::command::{EncodeStep, EncoderCommand};
use crate::config::VideoConfig;
use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FRAME_PREFIX: &str = "frame_";
const FRAME_EXTENSION: &str = ".jpg";
const TIMELAPSE_SEGMENT: &str = "seg1.mp4";
const HOLD_SEGMENT: &str = "seg2.mp4";
const CONCAT_LIST: &str = "concat.txt";

/// Result of an assembly attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyOutcome {
    /// The video was written to this path
    Built(PathBuf),
    /// Nothing to assemble
    NoFrames,
}

/// Builds a fixed-duration video from numbered frames.
///
/// The output is a retimed timelapse segment followed by a hold of the last
/// frame, joined without re-encoding. Intermediate files are written next to
/// the frames and left for the caller to clean up.
#[derive(Debug, Clone)]
pub struct VideoAssembler {
    config: VideoConfig,
}

impl VideoAssembler {
    pub fn new(config: VideoConfig) -> Self {
        Self { config }
    }

    /// Playback-speed multiplier that renders `frames` frames in the target duration
    pub fn speed_factor(&self, frames: u32) -> f64 {
        let natural_secs = frames as f64 / self.config.source_fps as f64;
        self.config.target_duration_secs / natural_secs
    }

    /// Assemble `frames_dir` into `output`.
    ///
    /// `frame_count == 0` produces nothing and is not an error. An encoder
    /// failure aborts the remaining steps.
    pub async fn assemble(
        &self,
        frames_dir: &Path,
        frame_count: u32,
        output: &Path,
    ) -> Result<AssemblyOutcome> {
        if frame_count == 0 {
            warn!("No frames captured; skipping video build");
            return Ok(AssemblyOutcome::NoFrames);
        }

        let encoder = EncoderCommand::from_config(&self.config)?;
        let frames_dir = tokio::fs::canonicalize(frames_dir).await?;

        let frames = compact_frames(&frames_dir).await?;
        if frames == 0 {
            warn!(
                "Frame count was {} but {} holds no frames; skipping video build",
                frame_count,
                frames_dir.display()
            );
            return Ok(AssemblyOutcome::NoFrames);
        }
        if frames != frame_count {
            debug!(
                "Assembling {} frames present on disk (frame count {})",
                frames, frame_count
            );
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let timelapse = frames_dir.join(TIMELAPSE_SEGMENT);
        let hold = frames_dir.join(HOLD_SEGMENT);
        let last_frame = frames_dir.join(frame_file_name(frames - 1));
        let pattern = frames_dir.join(format!("{}%05d{}", FRAME_PREFIX, FRAME_EXTENSION));
        let speed = self.speed_factor(frames);

        info!(
            "Step 1/3: building {}s timelapse segment from {} frames (speed {:.6})",
            self.config.target_duration_secs, frames, speed
        );
        encoder
            .run(
                EncodeStep::Timelapse,
                &encoder.timelapse_args(&pattern, speed, &timelapse),
            )
            .await?;

        info!(
            "Step 2/3: building {}s hold segment from {}",
            self.config.hold_duration_secs,
            last_frame.display()
        );
        encoder
            .run(
                EncodeStep::Hold,
                &encoder.hold_args(&last_frame, self.config.hold_duration_secs, &hold),
            )
            .await?;

        let list = frames_dir.join(CONCAT_LIST);
        tokio::fs::write(
            &list,
            format!("file '{}'\nfile '{}'\n", timelapse.display(), hold.display()),
        )
        .await?;

        info!("Step 3/3: concatenating segments into {}", output.display());
        encoder
            .run(EncodeStep::Concat, &encoder.concat_args(&list, output))
            .await?;

        info!("Video written to {}", output.display());
        Ok(AssemblyOutcome::Built(output.to_path_buf()))
    }
}

/// File name of the frame stored under `index`
pub fn frame_file_name(index: u32) -> String {
    format!("{}{:05}{}", FRAME_PREFIX, index, FRAME_EXTENSION)
}

fn frame_index(file_name: &str) -> Option<u32> {
    let digits = file_name
        .strip_prefix(FRAME_PREFIX)?
        .strip_suffix(FRAME_EXTENSION)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Renumber the frames in `dir` into a gap-free sequence starting at 0.
///
/// Order is preserved. Returns the number of frames.
pub async fn compact_frames(dir: &Path) -> Result<u32> {
    let mut indices = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if let Some(index) = entry.file_name().to_str().and_then(frame_index) {
            indices.push((index, entry.path()));
        }
    }
    indices.sort_by_key(|(index, _)| *index);

    // Targets never exceed sources, so ascending renames cannot collide
    for (position, (index, path)) in indices.iter().enumerate() {
        let position = position as u32;
        if *index != position {
            let target = dir.join(frame_file_name(position));
            debug!("Renumbering {} -> {}", path.display(), target.display());
            tokio::fs::rename(path, &target).await?;
        }
    }

    Ok(indices.len() as u32)
}
