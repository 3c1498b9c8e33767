//! FramePipeline - Live Frame Processing
//!
//! ## Flow
//!
//! ```text
//! submit(frame) ──► AdmissionController ──(full)──► dropped + logged
//!                        │
//!                     permit
//!                        ▼
//!               ScratchStore (temp_frame_*.jpg)
//!                        ▼
//!               DetectionWorker::run_frame
//!                        ▼
//!               RealtimeHub::broadcast (frame, detections)
//! ```
//!
//! Each admitted frame runs in its own task and owns its permit and scratch
//! file. Completion order across frames is not guaranteed.

use crate::admission_controller::{AdmissionController, AdmissionPermit};
use crate::detection_worker::{DetectionWorker, FrameOutcome};
use crate::realtime_hub::{HubMessage, RealtimeHub};
use crate::scratch_store::ScratchStore;
use bytes::Bytes;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Terminal outcome of one admitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Annotated frame and detection result broadcast
    Broadcast,
    /// Annotated frame broadcast; worker output was not a valid result
    BroadcastWithoutDetections,
    /// Scratch write, worker or read-back failed; nothing broadcast
    Failed,
}

/// Result of submitting a frame
#[derive(Debug)]
pub enum Submission {
    Admitted(JoinHandle<FrameDisposition>),
    Dropped,
}

impl Submission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Submission::Admitted(_))
    }
}

/// FramePipeline instance
pub struct FramePipeline {
    admission: Arc<AdmissionController>,
    scratch: Arc<ScratchStore>,
    worker: Arc<DetectionWorker>,
    hub: Arc<RealtimeHub>,
}

impl FramePipeline {
    /// Create new FramePipeline
    pub fn new(
        admission: Arc<AdmissionController>,
        scratch: Arc<ScratchStore>,
        worker: Arc<DetectionWorker>,
        hub: Arc<RealtimeHub>,
    ) -> Self {
        Self {
            admission,
            scratch,
            worker,
            hub,
        }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Admit or drop a frame. Admission is decided before this returns;
    /// processing continues in a spawned task.
    pub fn submit(self: &Arc<Self>, frame: Bytes) -> Submission {
        let Some(permit) = self.admission.try_admit() else {
            tracing::debug!(bytes = frame.len(), "Frame dropped at admission");
            return Submission::Dropped;
        };

        let pipeline = Arc::clone(self);
        Submission::Admitted(tokio::spawn(async move { pipeline.process(permit, frame).await }))
    }

    /// Process one admitted frame to its terminal outcome.
    ///
    /// The permit is released when this returns, on every path.
    pub async fn process(&self, permit: AdmissionPermit, frame: Bytes) -> FrameDisposition {
        let frame_id = permit.frame_id();
        tracing::info!(
            frame_id,
            bytes = frame.len(),
            in_flight = self.admission.in_flight(),
            "Processing frame start"
        );

        let artifact = match self.scratch.create("temp_frame", "jpg", &frame).await {
            Ok(a) => a,
            Err(e) => {
                tracing::error!(frame_id, error = %e, "Error saving frame");
                return FrameDisposition::Failed;
            }
        };

        let outcome = self.worker.run_frame(&artifact).await;
        artifact.remove().await;

        let disposition = match outcome {
            Ok(FrameOutcome { image, result }) => {
                let frame_report = self.hub.broadcast(HubMessage::Frame(image));
                match result {
                    Ok(result) => {
                        tracing::info!(
                            frame_id,
                            pets = result.pets,
                            humans = result.humans,
                            viewers = frame_report.delivered,
                            "Detections broadcast"
                        );
                        self.hub.broadcast(HubMessage::Detection(result));
                        FrameDisposition::Broadcast
                    }
                    Err(e) => {
                        tracing::warn!(frame_id, error = %e, "Could not parse detection result");
                        FrameDisposition::BroadcastWithoutDetections
                    }
                }
            }
            Err(e) => {
                tracing::error!(frame_id, error = %e, "Frame processing failed");
                FrameDisposition::Failed
            }
        };

        drop(permit);
        tracing::info!(frame_id, in_flight = self.admission.in_flight(), "Processing frame complete");
        disposition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection_worker::testing::script_worker;
    use crate::realtime_hub::SocketPayload;
    use std::path::Path;
    use std::time::Duration;

    async fn pipeline(dir: &Path, bound: usize, script: &str) -> (Arc<FramePipeline>, Arc<RealtimeHub>, Arc<ScratchStore>) {
        let hub = Arc::new(RealtimeHub::default());
        let scratch = Arc::new(ScratchStore::new(dir.join("scratch")).await.unwrap());
        let worker = Arc::new(DetectionWorker::new(script_worker(dir, "live.sh", script)));
        let pipeline = Arc::new(FramePipeline::new(
            Arc::new(AdmissionController::new(bound)),
            scratch.clone(),
            worker,
            hub.clone(),
        ));
        (pipeline, hub, scratch)
    }

    fn scratch_files(store: &ScratchStore) -> usize {
        std::fs::read_dir(store.dir()).unwrap().count()
    }

    const OK_SCRIPT: &str = "printf 'annotated' > \"$1\"\n\
        echo '{\"pets\":0,\"humans\":1,\"detections\":[{\"type\":\"human\",\"label\":\"person\",\"confidence\":0.75}]}'\n";

    #[tokio::test]
    async fn test_success_broadcasts_frame_then_detections() {
        let tmp = tempfile::tempdir().unwrap();
        let (pipeline, hub, scratch) = pipeline(tmp.path(), 3, OK_SCRIPT).await;
        let (_id, mut rx) = hub.sockets().register();

        let Submission::Admitted(handle) = pipeline.submit(Bytes::from_static(b"raw")) else {
            panic!("frame should be admitted");
        };
        assert_eq!(handle.await.unwrap(), FrameDisposition::Broadcast);

        assert_eq!(
            rx.recv().await,
            Some(SocketPayload::Binary(Bytes::from_static(b"annotated")))
        );
        let Some(SocketPayload::Text(text)) = rx.recv().await else {
            panic!("expected detections message");
        };
        assert!(text.contains("\"detections\""));

        assert_eq!(pipeline.admission().in_flight(), 0);
        assert_eq!(scratch.live_count(), 0);
        assert_eq!(scratch_files(&scratch), 0);
    }

    #[tokio::test]
    async fn test_five_simultaneous_arrivals_drop_two() {
        let tmp = tempfile::tempdir().unwrap();
        let script = format!("sleep 0.3\n{}", OK_SCRIPT);
        let (pipeline, _hub, scratch) = pipeline(tmp.path(), 3, &script).await;

        let submissions: Vec<_> = (0..5)
            .map(|_| pipeline.submit(Bytes::from_static(b"raw")))
            .collect();

        assert_eq!(submissions.iter().filter(|s| s.is_admitted()).count(), 3);
        assert_eq!(pipeline.admission().status().dropped, 2);
        assert!(pipeline.admission().in_flight() <= 3);

        for s in submissions {
            if let Submission::Admitted(h) = s {
                h.await.unwrap();
            }
        }
        assert_eq!(pipeline.admission().in_flight(), 0);
        assert_eq!(scratch_files(&scratch), 0);
    }

    #[tokio::test]
    async fn test_in_flight_matches_scratch_count() {
        let tmp = tempfile::tempdir().unwrap();
        let script = format!("sleep 0.5\n{}", OK_SCRIPT);
        let (pipeline, _hub, scratch) = pipeline(tmp.path(), 2, &script).await;

        let a = pipeline.submit(Bytes::from_static(b"a"));
        let b = pipeline.submit(Bytes::from_static(b"b"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(pipeline.admission().in_flight(), 2);
        assert_eq!(scratch.live_count(), 2);

        for s in [a, b] {
            if let Submission::Admitted(h) = s {
                h.await.unwrap();
            }
        }
        assert_eq!(scratch.live_count(), 0);
    }

    #[tokio::test]
    async fn test_worker_failure_cleans_up_without_broadcast() {
        let tmp = tempfile::tempdir().unwrap();
        let (pipeline, hub, scratch) = pipeline(tmp.path(), 3, "exit 1\n").await;
        let (_id, mut rx) = hub.sockets().register();

        let Submission::Admitted(handle) = pipeline.submit(Bytes::from_static(b"raw")) else {
            panic!("frame should be admitted");
        };
        assert_eq!(handle.await.unwrap(), FrameDisposition::Failed);

        assert!(rx.try_recv().is_err());
        assert_eq!(pipeline.admission().in_flight(), 0);
        assert_eq!(scratch_files(&scratch), 0);
    }

    #[tokio::test]
    async fn test_parse_failure_broadcasts_frame_only() {
        let tmp = tempfile::tempdir().unwrap();
        let (pipeline, hub, scratch) = pipeline(tmp.path(), 3, "echo 'not json'\n").await;
        let (_id, mut rx) = hub.event_streams().register();

        let Submission::Admitted(handle) = pipeline.submit(Bytes::from_static(b"raw")) else {
            panic!("frame should be admitted");
        };
        assert_eq!(handle.await.unwrap(), FrameDisposition::BroadcastWithoutDetections);

        assert_eq!(rx.recv().await.unwrap().name, "frame");
        assert!(rx.try_recv().is_err());
        assert_eq!(pipeline.admission().in_flight(), 0);
        assert_eq!(scratch_files(&scratch), 0);
    }

    #[tokio::test]
    async fn test_timeout_releases_slot_and_scratch() {
        let tmp = tempfile::tempdir().unwrap();
        let hub = Arc::new(RealtimeHub::default());
        let scratch = Arc::new(ScratchStore::new(tmp.path().join("scratch")).await.unwrap());
        let mut config = script_worker(tmp.path(), "live.sh", "sleep 5\n");
        config.frame_timeout = Duration::from_millis(200);
        let pipeline = Arc::new(FramePipeline::new(
            Arc::new(AdmissionController::new(1)),
            scratch.clone(),
            Arc::new(DetectionWorker::new(config)),
            hub,
        ));

        let Submission::Admitted(handle) = pipeline.submit(Bytes::from_static(b"raw")) else {
            panic!("frame should be admitted");
        };
        assert!(!pipeline.submit(Bytes::from_static(b"late")).is_admitted());
        assert_eq!(handle.await.unwrap(), FrameDisposition::Failed);

        assert_eq!(pipeline.admission().in_flight(), 0);
        assert_eq!(scratch.live_count(), 0);
        assert!(pipeline.submit(Bytes::from_static(b"again")).is_admitted());
    }
}
