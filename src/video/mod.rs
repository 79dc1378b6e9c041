mod assembler;
mod command;
mod naming;
#[cfg(test)]
mod tests;

pub use assembler::{compact_frames, frame_file_name, AssemblyOutcome, VideoAssembler};
pub use command::{EncodeStep, EncoderCommand};
pub use naming::{base_file_name, resolve_output_path, sanitize_job_name};
