//! BatchService - Single-shot detection on uploaded files
//!
//! ## Flow
//!
//! ```text
//! POST /upload ──► stage (extension + size checks, scratch file)
//!                    ▼
//!              DetectionWorker::run_batch(scratch, OUTPUT_DIR/processed_{name})
//!                    ▼
//!              copy original into UPLOAD_DIR, remove scratch
//! ```
//!
//! Batch jobs are not subject to the live admission bound; each request
//! waits synchronously for its own worker.

use crate::detection_worker::DetectionWorker;
use crate::error::{Error, Result};
use crate::media_server::sanitize_filename;
use crate::models::{DeleteResponse, FileEntry, FileType, UploadResponse};
use crate::scratch_store::{ScratchArtifact, ScratchStore};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Accepted upload extensions (lowercase)
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "gif", "mp4", "avi", "mov", "mkv"];

/// Default upload size limit (100 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Batch settings
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_file_size: u64,
}

/// Upload written to scratch, ready for the worker
#[derive(Debug)]
pub struct StagedUpload {
    artifact: ScratchArtifact,
    stored_name: String,
    file_type: FileType,
    size: u64,
}

impl StagedUpload {
    /// `{millis}-{random}.{ext}`
    pub fn stored_name(&self) -> &str {
        &self.stored_name
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// BatchService instance
pub struct BatchService {
    worker: Arc<DetectionWorker>,
    scratch: Arc<ScratchStore>,
    config: BatchConfig,
}

impl BatchService {
    /// Create new BatchService
    pub fn new(worker: Arc<DetectionWorker>, scratch: Arc<ScratchStore>, config: BatchConfig) -> Self {
        Self {
            worker,
            scratch,
            config,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Write an upload body to scratch.
    ///
    /// Rejects unknown extensions before reading and aborts as soon as the
    /// body exceeds `max_file_size`. The scratch file is removed on rejection.
    pub async fn stage<S>(
        &self,
        original_name: &str,
        content_type: Option<&str>,
        body: S,
    ) -> Result<StagedUpload>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        let extension = allowed_extension(original_name)?;
        let (artifact, mut file) = self.scratch.create_empty("upload", &extension).await?;

        let mut body = std::pin::pin!(body);
        let mut size: u64 = 0;
        let written: Result<()> = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                size += chunk.len() as u64;
                if size > self.config.max_file_size {
                    return Err(Error::PayloadTooLarge(format!(
                        "File exceeds maximum size of {} bytes",
                        self.config.max_file_size
                    )));
                }
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok(())
        }
        .await;
        drop(file);

        if let Err(e) = written {
            tracing::warn!(original = %original_name, bytes = size, error = %e, "Upload rejected");
            artifact.remove().await;
            return Err(e);
        }

        let stored_name = stored_name(&extension);
        tracing::info!(
            original = %original_name,
            stored = %stored_name,
            bytes = size,
            "Upload staged"
        );

        Ok(StagedUpload {
            artifact,
            stored_name,
            file_type: FileType::detect(content_type, original_name),
            size,
        })
    }

    /// Run the batch worker on a staged upload. The scratch file is removed
    /// whatever the outcome.
    pub async fn process(&self, staged: StagedUpload) -> Result<UploadResponse> {
        let result = self.run_staged(&staged).await;
        staged.artifact.remove().await;
        result
    }

    async fn run_staged(&self, staged: &StagedUpload) -> Result<UploadResponse> {
        let output_file = format!("processed_{}", staged.stored_name);
        let output_path = self.config.output_dir.join(&output_file);

        tracing::info!(
            input = %staged.artifact.path().display(),
            output = %output_path.display(),
            "Processing uploaded file"
        );

        let outcome = self.worker.run_batch(staged.artifact.path(), &output_path).await?;

        let original_path = self.config.upload_dir.join(&staged.stored_name);
        tokio::fs::copy(staged.artifact.path(), &original_path).await?;

        Ok(UploadResponse {
            success: true,
            original_file: staged.stored_name.clone(),
            output_url: format!("/output/{}", output_file),
            output_file,
            file_type: staged.file_type,
            stats: outcome.stats,
        })
    }

    /// Processed outputs, sorted by name
    pub async fn list_outputs(&self) -> Result<Vec<FileEntry>> {
        let read_failed = |e: std::io::Error| {
            tracing::error!(dir = %self.config.output_dir.display(), error = %e, "Failed to read output directory");
            Error::Internal("Failed to read output directory".to_string())
        };

        let mut entries = tokio::fs::read_dir(&self.config.output_dir)
            .await
            .map_err(read_failed)?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_failed)? {
            if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            files.push(FileEntry {
                url: format!("/output/{}", name),
                file_type: FileType::from_extension(&name),
                name,
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Delete one processed output
    pub async fn delete_output(&self, filename: &str) -> Result<DeleteResponse> {
        let filename = sanitize_filename(filename)?;
        let path = self.config.output_dir.join(filename);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(file = %filename, "Output file deleted");
                Ok(DeleteResponse {
                    success: true,
                    message: "File deleted successfully".to_string(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(filename.to_string()))
            }
            Err(e) => {
                tracing::error!(file = %filename, error = %e, "Failed to delete file");
                Err(Error::Internal("Failed to delete file".to_string()))
            }
        }
    }
}

/// Lowercase extension of `name` if it is an accepted media type
fn allowed_extension(name: &str) -> Result<String> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(ext),
        _ => Err(Error::Validation("Only images and videos are allowed!".to_string())),
    }
}

fn stored_name(extension: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{}-{}.{}", millis, suffix, extension)
}
