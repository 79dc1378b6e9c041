use super::*;
use crate::config::{TimelapserConfig, VideoConfig};
use crate::error::{EncoderError, TimelapserError};
use chrono::NaiveDate;
use std::path::Path;
use tempfile::TempDir;

/// Shell stand-in for ffmpeg: logs its arguments, creates the output file
/// (last argument) and exits non-zero when the arguments match `fail_on`.
fn fake_encoder(log: &Path, fail_on: Option<&str>) -> Vec<String> {
    let failure = fail_on
        .map(|pattern| format!("case \"$*\" in *{}*) exit 3;; esac\n", pattern))
        .unwrap_or_default();
    let script = format!(
        "printf '%s\\n' \"$*\" >> '{}'\n{}for last; do :; done\ntouch \"$last\"\n",
        log.display(),
        failure
    );
    vec![
        "sh".to_string(),
        "-c".to_string(),
        script,
        "ffmpeg".to_string(),
    ]
}

fn video_config(encoder_command: Vec<String>) -> VideoConfig {
    VideoConfig {
        encoder_command,
        ..TimelapserConfig::default().video
    }
}

fn write_frames(dir: &Path, indices: &[u32]) {
    for index in indices {
        std::fs::write(dir.join(frame_file_name(*index)), format!("jpeg-{}", index)).unwrap();
    }
}

fn logged_invocations(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

#[tokio::test]
async fn test_zero_frames_is_a_no_op() {
    let frames = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let log = frames.path().join("encoder.log");
    let output = output_dir.path().join("out.mp4");

    let assembler = VideoAssembler::new(video_config(fake_encoder(&log, None)));
    let outcome = assembler.assemble(frames.path(), 0, &output).await.unwrap();

    assert_eq!(outcome, AssemblyOutcome::NoFrames);
    assert!(!output.exists());
    assert!(logged_invocations(&log).is_empty());
}

#[tokio::test]
async fn test_assemble_runs_three_steps_in_order() {
    let frames = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let log = output_dir.path().join("encoder.log");
    let output = output_dir.path().join("2024-01-01_benchy.mp4");
    write_frames(frames.path(), &[0, 1, 2]);

    let assembler = VideoAssembler::new(video_config(fake_encoder(&log, None)));
    let outcome = assembler.assemble(frames.path(), 3, &output).await.unwrap();

    assert_eq!(outcome, AssemblyOutcome::Built(output.clone()));
    assert!(output.exists());

    let calls = logged_invocations(&log);
    assert_eq!(calls.len(), 3);

    // 3 frames at 30 fps last 0.1s; stretched to 5s
    assert!(calls[0].contains("-framerate 30 -start_number 0"));
    assert!(calls[0].contains("frame_%05d.jpg"));
    assert!(calls[0].contains("setpts=50.000000*PTS"));
    assert!(calls[0].contains("-c:v libx264 -pix_fmt yuv420p"));
    assert!(calls[0].ends_with("seg1.mp4"));

    assert!(calls[1].contains("-loop 1 -t 5 -i"));
    assert!(calls[1].contains("frame_00002.jpg"));
    assert!(calls[1].ends_with("seg2.mp4"));

    assert!(calls[2].contains("-f concat -safe 0"));
    assert!(calls[2].contains("-c copy"));
    assert!(calls[2].ends_with("2024-01-01_benchy.mp4"));

    let list = std::fs::read_to_string(frames.path().join("concat.txt")).unwrap();
    let lines: Vec<&str> = list.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("file '") && lines[0].ends_with("seg1.mp4'"));
    assert!(lines[1].ends_with("seg2.mp4'"));
}

#[tokio::test]
async fn test_failed_step_aborts_remaining_steps() {
    let frames = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let log = output_dir.path().join("encoder.log");
    let output = output_dir.path().join("out.mp4");
    write_frames(frames.path(), &[0, 1]);

    let assembler = VideoAssembler::new(video_config(fake_encoder(&log, Some("-loop"))));
    let result = assembler.assemble(frames.path(), 2, &output).await;

    match result {
        Err(TimelapserError::Encoder(EncoderError::Failed { step, .. })) => {
            assert_eq!(step, EncodeStep::Hold.label());
        }
        other => panic!("expected hold step failure, got {:?}", other),
    }

    assert_eq!(logged_invocations(&log).len(), 2);
    assert!(!output.exists());
    // Earlier segment is left behind for the caller to clean up
    assert!(frames.path().join("seg1.mp4").exists());
}

#[tokio::test]
async fn test_gaps_are_compacted_before_encoding() {
    let frames = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let log = output_dir.path().join("encoder.log");
    let output = output_dir.path().join("out.mp4");
    write_frames(frames.path(), &[0, 2, 5]);

    let assembler = VideoAssembler::new(video_config(fake_encoder(&log, None)));
    let outcome = assembler.assemble(frames.path(), 6, &output).await.unwrap();
    assert_eq!(outcome, AssemblyOutcome::Built(output));

    for (position, original) in [(0, 0), (1, 2), (2, 5)] {
        let content = std::fs::read_to_string(frames.path().join(frame_file_name(position))).unwrap();
        assert_eq!(content, format!("jpeg-{}", original));
    }
    assert!(!frames.path().join(frame_file_name(5)).exists());

    let calls = logged_invocations(&log);
    assert!(calls[1].contains("frame_00002.jpg"));
}

#[tokio::test]
async fn test_compact_ignores_unrelated_files() {
    let frames = TempDir::new().unwrap();
    write_frames(frames.path(), &[3, 7]);
    std::fs::write(frames.path().join("seg1.mp4"), b"").unwrap();
    std::fs::write(frames.path().join("frame_abc.jpg"), b"").unwrap();

    assert_eq!(compact_frames(frames.path()).await.unwrap(), 2);
    assert!(frames.path().join("frame_00000.jpg").exists());
    assert!(frames.path().join("frame_00001.jpg").exists());
    assert!(frames.path().join("frame_abc.jpg").exists());
}

#[test]
fn test_speed_factor_normalizes_duration() {
    let assembler = VideoAssembler::new(TimelapserConfig::default().video);

    for frames in [1u32, 7, 150, 300, 4321] {
        let rendered = frames as f64 / 30.0 * assembler.speed_factor(frames);
        assert!((rendered - 5.0).abs() < 1.0 / 30.0, "{} frames -> {}s", frames, rendered);
    }
    assert!((assembler.speed_factor(150) - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_missing_encoder_reports_spawn_failure() {
    let frames = TempDir::new().unwrap();
    write_frames(frames.path(), &[0]);

    let assembler = VideoAssembler::new(video_config(vec![
        "/nonexistent/timelapser-encoder".to_string(),
    ]));
    let result = assembler
        .assemble(frames.path(), 1, &frames.path().join("out.mp4"))
        .await;

    assert!(matches!(
        result,
        Err(TimelapserError::Encoder(EncoderError::Spawn { .. }))
    ));
}

#[test]
fn test_empty_encoder_command_is_rejected() {
    let result = EncoderCommand::from_config(&video_config(Vec::new()));
    assert!(matches!(result, Err(EncoderError::EmptyCommand)));
}

#[test]
fn test_leading_encoder_arguments_are_kept() {
    let command = EncoderCommand::from_config(&video_config(vec![
        "nice".to_string(),
        "ffmpeg".to_string(),
    ]))
    .unwrap();
    let args = command.concat_args(Path::new("list.txt"), Path::new("out.mp4"));
    assert_eq!(args.first().map(String::as_str), Some("-y"));
    assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
}

#[test]
fn test_base_file_name() {
    assert_eq!(base_file_name(date(), Some("benchy")), "2024-01-01_benchy.mp4");
    assert_eq!(base_file_name(date(), None), "2024-01-01_timelapse.mp4");
    assert_eq!(base_file_name(date(), Some("  ")), "2024-01-01_timelapse.mp4");
}

#[test]
fn test_sanitize_job_name() {
    assert_eq!(sanitize_job_name("plate_1.gcode.3mf").as_deref(), Some("plate_1.gcode.3mf"));
    assert_eq!(sanitize_job_name("../etc/passwd").as_deref(), Some(".._etc_passwd"));
    assert_eq!(sanitize_job_name("a\tb").as_deref(), Some("a_b"));
    assert_eq!(sanitize_job_name(".."), None);
}

#[test]
fn test_output_name_collision_appends_suffix() {
    let output = TempDir::new().unwrap();

    let first = resolve_output_path(output.path(), date(), Some("test"), 1000).unwrap();
    assert_eq!(first, output.path().join("2024-01-01_test.mp4"));
    std::fs::write(&first, b"video").unwrap();

    let second = resolve_output_path(output.path(), date(), Some("test"), 1000).unwrap();
    assert_eq!(second, output.path().join("2024-01-01_test_1.mp4"));
    std::fs::write(&second, b"video").unwrap();

    let third = resolve_output_path(output.path(), date(), Some("test"), 1000).unwrap();
    assert_eq!(third, output.path().join("2024-01-01_test_2.mp4"));

    // The existing video is untouched
    assert_eq!(std::fs::read(&first).unwrap(), b"video");
}

#[test]
fn test_output_name_exhaustion_is_reported() {
    let output = TempDir::new().unwrap();
    std::fs::write(output.path().join("2024-01-01_test.mp4"), b"").unwrap();
    std::fs::write(output.path().join("2024-01-01_test_1.mp4"), b"").unwrap();

    match resolve_output_path(output.path(), date(), Some("test"), 2) {
        Err(TimelapserError::NamingExhausted { base, attempts }) => {
            assert_eq!(base, output.path().join("2024-01-01_test.mp4"));
            assert_eq!(attempts, 2);
        }
        other => panic!("expected naming exhaustion, got {:?}", other),
    }
}
