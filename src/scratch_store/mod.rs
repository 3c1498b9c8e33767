//! ScratchStore - Ephemeral files handed to the detection worker
//!
//! ## Responsibilities
//!
//! - Unique scratch paths (timestamp + random suffix) under one directory
//! - Exclusive ownership of each file by the invocation that created it
//! - Removal exactly once on every exit path
//!
//! `ScratchArtifact::remove` is the normal path. If an artifact is dropped
//! without being removed (early return, panic, cancelled task), `Drop`
//! removes the file synchronously instead.

use crate::error::Result;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::fs;

/// ScratchStore instance
#[derive(Debug)]
pub struct ScratchStore {
    dir: PathBuf,
    live: Arc<AtomicUsize>,
}

impl ScratchStore {
    /// Create new ScratchStore, creating `dir` if needed
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Scratch directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of artifacts currently on disk
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Write `data` to a fresh, uniquely named file.
    ///
    /// `prefix` and `extension` only shape the file name
    /// (`{prefix}_{millis}_{random}.{extension}`).
    pub async fn create(&self, prefix: &str, extension: &str, data: &[u8]) -> Result<ScratchArtifact> {
        let path = self.dir.join(unique_name(prefix, extension));
        fs::write(&path, data).await?;
        Ok(self.track(path))
    }

    /// Reserve a unique path and create an empty file there.
    ///
    /// Used by callers that stream content in (uploads).
    pub async fn create_empty(&self, prefix: &str, extension: &str) -> Result<(ScratchArtifact, fs::File)> {
        let path = self.dir.join(unique_name(prefix, extension));
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok((self.track(path), file))
    }

    fn track(&self, path: PathBuf) -> ScratchArtifact {
        let live = self.live.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(path = %path.display(), live, "Scratch artifact created");
        ScratchArtifact {
            path,
            live: self.live.clone(),
            removed: false,
        }
    }
}

/// One scratch file, owned by a single invocation
#[derive(Debug)]
pub struct ScratchArtifact {
    path: PathBuf,
    live: Arc<AtomicUsize>,
    removed: bool,
}

impl ScratchArtifact {
    /// Path on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read current contents (the worker may have rewritten the file)
    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.path).await?)
    }

    /// Delete the file. Consumes the artifact so it cannot be removed twice.
    pub async fn remove(mut self) {
        self.removed = true;
        self.live.fetch_sub(1, Ordering::AcqRel);
        match fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Temp file cleaned up"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "Temp file already missing")
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Could not delete temp file")
            }
        }
    }
}

impl Drop for ScratchArtifact {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        self.live.fetch_sub(1, Ordering::AcqRel);
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::error!(path = %self.path.display(), error = %e, "Could not delete temp file");
            }
        } else {
            tracing::debug!(path = %self.path.display(), "Temp file cleaned up on drop");
        }
    }
}

/// `{prefix}_{unix_millis}_{random}.{ext}`
fn unique_name(prefix: &str, extension: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    let ext = extension.trim_start_matches('.');
    if ext.is_empty() {
        format!("{}_{}_{}", prefix, millis, suffix)
    } else {
        format!("{}_{}_{}.{}", prefix, millis, suffix, ext)
    }
}
