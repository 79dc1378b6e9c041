use crate::error::{Result, TimelapserError};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

const DEFAULT_JOB_NAME: &str = "timelapse";

/// Make a printer-reported job name safe to use in a file name
pub fn sanitize_job_name(name: &str) -> Option<String> {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        None
    } else {
        Some(sanitized)
    }
}

/// `<date>_<job>` stem, without the extension
fn file_stem(date: NaiveDate, job_name: Option<&str>) -> String {
    let job = job_name
        .and_then(sanitize_job_name)
        .unwrap_or_else(|| DEFAULT_JOB_NAME.to_string());
    format!("{}_{}", date.format("%Y-%m-%d"), job)
}

/// Preferred output file name: `<YYYY-MM-DD>_<job>.mp4`
pub fn base_file_name(date: NaiveDate, job_name: Option<&str>) -> String {
    format!("{}.mp4", file_stem(date, job_name))
}

/// First free output path: the base name, then `_1`, `_2`, ...
///
/// Gives up after `max_attempts` candidates with
/// [`TimelapserError::NamingExhausted`] instead of overwriting.
pub fn resolve_output_path(
    output_dir: &Path,
    date: NaiveDate,
    job_name: Option<&str>,
    max_attempts: u32,
) -> Result<PathBuf> {
    let stem = file_stem(date, job_name);
    let base = output_dir.join(format!("{}.mp4", stem));

    for attempt in 0..max_attempts {
        let candidate = if attempt == 0 {
            base.clone()
        } else {
            output_dir.join(format!("{}_{}.mp4", stem, attempt))
        };

        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(TimelapserError::NamingExhausted {
        base,
        attempts: max_attempts,
    })
}
