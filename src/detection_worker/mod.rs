//! DetectionWorker - External Detection Process Adapter
//!
//! ## Responsibilities
//!
//! - Spawn the detection worker as a separate OS process
//! - Frame mode: `<program> <frame args...> <scratch.jpg>`; the worker rewrites
//!   the file with the annotated image and prints a result document
//! - Batch mode: `<program> <batch args...> <input> <output>`; the worker
//!   writes the annotated artifact to `<output>` and prints progress lines
//! - Bounded wait per invocation; a timed-out worker is killed
//!
//! Scratch files are owned by the caller. No retry is attempted here.

mod parse;
mod types;

pub use parse::{parse_batch_output, parse_frame_output, parse_legacy_batch_output, RESULT_SCHEMA_VERSION};
pub use types::*;

use crate::error::{Error, Result};
use crate::scratch_store::ScratchArtifact;
use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Default frame-mode timeout (seconds)
pub const DEFAULT_FRAME_TIMEOUT_SEC: u64 = 30;
/// Default batch-mode timeout (seconds)
pub const DEFAULT_BATCH_TIMEOUT_SEC: u64 = 1800;

/// How to launch the worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Executable (interpreter or wrapper script)
    pub program: String,
    /// Leading args for frame mode (e.g. `detect_live.py`)
    pub frame_args: Vec<String>,
    /// Leading args for batch mode (e.g. `detect.py`)
    pub batch_args: Vec<String>,
    pub frame_timeout: Duration,
    pub batch_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            frame_args: vec!["detect_live.py".to_string()],
            batch_args: vec!["detect.py".to_string()],
            frame_timeout: Duration::from_secs(DEFAULT_FRAME_TIMEOUT_SEC),
            batch_timeout: Duration::from_secs(DEFAULT_BATCH_TIMEOUT_SEC),
        }
    }
}

/// Captured output of one worker run
struct WorkerOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// DetectionWorker instance
#[derive(Debug)]
pub struct DetectionWorker {
    config: WorkerConfig,
}

impl DetectionWorker {
    /// Create new DetectionWorker
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run frame-mode detection on a scratch image.
    ///
    /// `Err` covers spawn failure, timeout and non-zero exit. A parse failure
    /// is not an error here: it is reported inside `FrameOutcome::result`.
    pub async fn run_frame(&self, frame: &ScratchArtifact) -> Result<FrameOutcome> {
        let mut args: Vec<OsString> = self.config.frame_args.iter().map(OsString::from).collect();
        args.push(frame.path().as_os_str().to_owned());

        let output = self.invoke(args, self.config.frame_timeout).await?;

        if !output.status.success() {
            tracing::error!(
                exit_code = ?output.status.code(),
                stdout = %output.stdout.trim(),
                stderr = %output.stderr.trim(),
                "Frame worker failed"
            );
            return Err(Error::WorkerFailed {
                details: failure_details(&output),
            });
        }

        let image = frame.read().await?;
        let result = parse_frame_output(&output.stdout);

        Ok(FrameOutcome {
            image: image.into(),
            result,
        })
    }

    /// Run batch-mode detection from `input` into `output`.
    ///
    /// Non-zero exit surfaces stderr as `WorkerFailed`; a zero exit without
    /// the output artifact is `MissingOutput`.
    pub async fn run_batch(&self, input: &Path, output: &Path) -> Result<BatchOutcome> {
        let mut args: Vec<OsString> = self.config.batch_args.iter().map(OsString::from).collect();
        args.push(input.as_os_str().to_owned());
        args.push(output.as_os_str().to_owned());

        let result = self.invoke(args, self.config.batch_timeout).await?;

        if !result.status.success() {
            tracing::error!(
                exit_code = ?result.status.code(),
                stderr = %result.stderr.trim(),
                "Batch worker exited with failure"
            );
            return Err(Error::WorkerFailed {
                details: failure_details(&result),
            });
        }

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            tracing::error!(output = %output.display(), "Batch worker exited 0 without output");
            return Err(Error::MissingOutput {
                details: result.stdout,
            });
        }

        let stats = parse_batch_output(&result.stdout);
        tracing::info!(
            total_frames = stats.total_frames,
            pet_alerts = stats.pet_alerts,
            humans_detected = stats.humans_detected,
            "Batch processing completed"
        );

        Ok(BatchOutcome {
            stats,
            stdout: result.stdout,
        })
    }

    /// Spawn the worker and wait for it with a timeout.
    ///
    /// `kill_on_drop(true)` means the child is killed when the timeout
    /// cancels `wait_with_output`.
    async fn invoke(&self, args: Vec<OsString>, timeout: Duration) -> Result<WorkerOutput> {
        tracing::debug!(program = %self.config.program, args = ?args, "Launching detection worker");

        let child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::WorkerFailed {
                details: format!("worker spawn failed: {}", e),
            })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if !stderr.trim().is_empty() {
                    tracing::warn!(stderr = %stderr.trim(), "Worker stderr");
                }
                Ok(WorkerOutput {
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr,
                })
            }
            Ok(Err(e)) => Err(Error::WorkerFailed {
                details: format!("worker execution failed: {}", e),
            }),
            Err(_) => {
                tracing::warn!(
                    timeout_sec = timeout.as_secs_f64(),
                    "Worker timeout, process killed via kill_on_drop"
                );
                Err(Error::WorkerFailed {
                    details: format!("worker timed out after {}s", timeout.as_secs_f64()),
                })
            }
        }
    }
}

fn failure_details(output: &WorkerOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        "Unknown error occurred".to_string()
    } else {
        stderr.to_string()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fake workers built from `sh` scripts

    use super::*;
    use std::path::PathBuf;

    /// Write `body` to `dir/name` and return a config that runs it via `sh`
    pub fn script_worker(dir: &Path, name: &str, body: &str) -> WorkerConfig {
        let path: PathBuf = dir.join(name);
        std::fs::write(&path, body).unwrap();
        let script = path.to_string_lossy().into_owned();
        WorkerConfig {
            program: "sh".to_string(),
            frame_args: vec![script.clone()],
            batch_args: vec![script],
            frame_timeout: Duration::from_secs(5),
            batch_timeout: Duration::from_secs(5),
        }
    }
}
