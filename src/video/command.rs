use crate::config::VideoConfig;
use crate::error::EncoderError;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error};

/// Assembly pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeStep {
    Timelapse,
    Hold,
    Concat,
}

impl EncodeStep {
    pub fn label(&self) -> &'static str {
        match self {
            EncodeStep::Timelapse => "timelapse segment",
            EncodeStep::Hold => "hold segment",
            EncodeStep::Concat => "concatenation",
        }
    }
}

impl fmt::Display for EncodeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// External encoder invocation (ffmpeg argument conventions)
#[derive(Debug, Clone)]
pub struct EncoderCommand {
    program: String,
    leading_args: Vec<String>,
    fps: u32,
    codec: String,
    pixel_format: String,
}

impl EncoderCommand {
    pub fn from_config(config: &VideoConfig) -> Result<Self, EncoderError> {
        let (program, leading_args) = config
            .encoder_command
            .split_first()
            .ok_or(EncoderError::EmptyCommand)?;

        Ok(Self {
            program: program.clone(),
            leading_args: leading_args.to_vec(),
            fps: config.source_fps,
            codec: config.codec.clone(),
            pixel_format: config.pixel_format.clone(),
        })
    }

    /// Numbered frame sequence, retimed by `speed_factor`
    pub fn timelapse_args(&self, pattern: &Path, speed_factor: f64, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-framerate".to_string(),
            self.fps.to_string(),
            "-start_number".to_string(),
            "0".to_string(),
            "-i".to_string(),
            pattern.display().to_string(),
            "-vf".to_string(),
            format!("setpts={:.6}*PTS", speed_factor),
        ];
        self.push_output_args(&mut args, output);
        args
    }

    /// Single image looped for `duration_secs`
    pub fn hold_args(&self, image: &Path, duration_secs: f64, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-loop".to_string(),
            "1".to_string(),
            "-t".to_string(),
            format!("{}", duration_secs),
            "-i".to_string(),
            image.display().to_string(),
        ];
        self.push_output_args(&mut args, output);
        args
    }

    /// Join the segments listed in `list` without re-encoding
    pub fn concat_args(&self, list: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list.display().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.display().to_string(),
        ]
    }

    fn push_output_args(&self, args: &mut Vec<String>, output: &Path) {
        args.extend([
            "-vsync".to_string(),
            "cfr".to_string(),
            "-r".to_string(),
            self.fps.to_string(),
            "-c:v".to_string(),
            self.codec.clone(),
            "-pix_fmt".to_string(),
            self.pixel_format.clone(),
            output.display().to_string(),
        ]);
    }

    /// Run one step to completion. Non-zero exit is a failure.
    pub async fn run(&self, step: EncodeStep, args: &[String]) -> Result<(), EncoderError> {
        debug!("Running encoder for {}: {} {:?}", step, self.program, args);

        let output = Command::new(&self.program)
            .args(&self.leading_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| EncoderError::Spawn {
                step: step.label(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(
                "Encoder failed during {} ({}): {}",
                step,
                output.status,
                stderr.trim()
            );
            return Err(EncoderError::Failed {
                step: step.label(),
                status: output.status.to_string(),
            });
        }

        Ok(())
    }
}
