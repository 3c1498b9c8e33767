//! Application state
//!
//! Holds all shared components and configuration

use crate::admission_controller::{AdmissionController, DEFAULT_MAX_IN_FLIGHT};
use crate::batch_service::{BatchConfig, BatchService, DEFAULT_MAX_FILE_SIZE};
use crate::detection_worker::{
    DetectionWorker, WorkerConfig, DEFAULT_BATCH_TIMEOUT_SEC, DEFAULT_FRAME_TIMEOUT_SEC,
};
use crate::error::Result;
use crate::frame_pipeline::FramePipeline;
use crate::media_server::MediaServer;
use crate::realtime_hub::{RealtimeHub, DEFAULT_VIEWER_QUEUE_DEPTH};
use crate::scratch_store::ScratchStore;
use crate::session_manager::{SessionManager, UpstreamConfig};
use crate::upstream_link::DEFAULT_CONNECT_TIMEOUT_SEC;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Retained original uploads
    pub upload_dir: PathBuf,
    /// Worker output files
    pub output_dir: PathBuf,
    /// Scratch files handed to the worker
    pub scratch_dir: PathBuf,
    /// Static frontend
    pub static_dir: PathBuf,
    /// Upload size limit (bytes)
    pub max_file_size: u64,
    /// Admission bound for live frames
    pub max_in_flight: usize,
    /// Detection worker launch settings
    pub worker: WorkerConfig,
    /// Upstream aggregator WebSocket URL
    pub upstream_url: Option<String>,
    /// Connect to the upstream aggregator at startup
    pub upstream_auto_connect: bool,
    /// Per-viewer outbound queue depth
    pub viewer_queue_depth: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 5010),
            upload_dir: env_path("UPLOAD_DIR", PathBuf::from("uploads")),
            output_dir: env_path("OUTPUT_DIR", PathBuf::from("output")),
            scratch_dir: env_path("SCRATCH_DIR", std::env::temp_dir().join("petwatch-scratch")),
            static_dir: env_path("STATIC_DIR", PathBuf::from("public")),
            max_file_size: env_parse("MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE),
            max_in_flight: env_parse("MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT),
            worker: WorkerConfig {
                program: std::env::var("WORKER_PROGRAM").unwrap_or_else(|_| "python".to_string()),
                frame_args: env_args("FRAME_WORKER_ARGS", "detect_live.py"),
                batch_args: env_args("BATCH_WORKER_ARGS", "detect.py"),
                frame_timeout: Duration::from_secs(env_parse(
                    "FRAME_WORKER_TIMEOUT_SEC",
                    DEFAULT_FRAME_TIMEOUT_SEC,
                )),
                batch_timeout: Duration::from_secs(env_parse(
                    "BATCH_WORKER_TIMEOUT_SEC",
                    DEFAULT_BATCH_TIMEOUT_SEC,
                )),
            },
            upstream_url: std::env::var("UPSTREAM_URL")
                .ok()
                .filter(|u| !u.trim().is_empty()),
            upstream_auto_connect: std::env::var("UPSTREAM_AUTO_CONNECT")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            viewer_queue_depth: env_parse("VIEWER_QUEUE_DEPTH", DEFAULT_VIEWER_QUEUE_DEPTH),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

/// Whitespace-separated argument list
fn env_args(key: &str, default: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// RealtimeHub (WebSocket/SSE)
    pub realtime: Arc<RealtimeHub>,
    /// AdmissionController (live frame bound)
    pub admission: Arc<AdmissionController>,
    /// ScratchStore (worker hand-off files)
    pub scratch: Arc<ScratchStore>,
    /// FramePipeline (live detection)
    pub pipeline: Arc<FramePipeline>,
    /// SessionManager (source link, viewers, upstream)
    pub session: Arc<SessionManager>,
    /// MediaServer (byte-range delivery)
    pub media: Arc<MediaServer>,
    /// BatchService (upload jobs)
    pub batch: Arc<BatchService>,
}

impl AppState {
    /// Build every component from `config`. Creates the upload, output
    /// and scratch directories.
    pub async fn build(config: AppConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.upload_dir).await?;
        tokio::fs::create_dir_all(&config.output_dir).await?;

        let realtime = Arc::new(RealtimeHub::new(config.viewer_queue_depth));
        let admission = Arc::new(AdmissionController::new(config.max_in_flight));
        let scratch = Arc::new(ScratchStore::new(config.scratch_dir.clone()).await?);
        let worker = Arc::new(DetectionWorker::new(config.worker.clone()));

        let pipeline = Arc::new(FramePipeline::new(
            admission.clone(),
            scratch.clone(),
            worker.clone(),
            realtime.clone(),
        ));

        let session = Arc::new(SessionManager::new(
            realtime.clone(),
            pipeline.clone(),
            UpstreamConfig {
                url: config.upstream_url.clone(),
                connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SEC),
            },
        ));

        let media = Arc::new(MediaServer::new(
            config.upload_dir.clone(),
            config.output_dir.clone(),
        ));

        let batch = Arc::new(BatchService::new(
            worker,
            scratch.clone(),
            BatchConfig {
                upload_dir: config.upload_dir.clone(),
                output_dir: config.output_dir.clone(),
                max_file_size: config.max_file_size,
            },
        ));

        Ok(Self {
            config,
            realtime,
            admission,
            scratch,
            pipeline,
            session,
            media,
            batch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_args_split() {
        assert_eq!(
            env_args("PETWATCH_TEST_UNSET_ARGS", "detect_live.py --fast"),
            vec!["detect_live.py", "--fast"]
        );
    }

    #[test]
    fn test_env_parse_falls_back() {
        assert_eq!(env_parse("PETWATCH_TEST_UNSET_PORT", 5010u16), 5010);
    }

    #[tokio::test]
    async fn test_build_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig {
            upload_dir: tmp.path().join("uploads"),
            output_dir: tmp.path().join("output"),
            scratch_dir: tmp.path().join("scratch"),
            ..AppConfig::default()
        };

        let state = AppState::build(config).await.unwrap();
        assert!(tmp.path().join("uploads").is_dir());
        assert!(tmp.path().join("output").is_dir());
        assert!(tmp.path().join("scratch").is_dir());
        assert_eq!(state.admission.bound(), state.config.max_in_flight.max(1));
    }
}
