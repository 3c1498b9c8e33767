//! PetWatch Relay Library
//!
//! Live pet/human detection relay: a camera source pushes JPEG frames, an
//! external detection worker annotates them, and the results fan out to
//! WebSocket and SSE viewers. Also serves stored media with byte ranges and
//! runs single-shot batch jobs on uploads.
//!
//! ## Architecture (9 Components)
//!
//! 1. SessionManager - Source link, viewer registration, upstream control
//! 2. AdmissionController - Bounded in-flight frames (drop, never queue)
//! 3. ScratchStore - Worker hand-off files, removed exactly once
//! 4. DetectionWorker - External process adapter (frame + batch mode)
//! 5. FramePipeline - Admitted frame -> worker -> broadcast
//! 6. RealtimeHub - Fan-out over pluggable transports (WebSocket/SSE)
//! 7. UpstreamLink - Outbound link to an external frame aggregator
//! 8. MediaServer - Byte-range file delivery
//! 9. BatchService - Upload, list and delete batch outputs
//!
//! ```text
//! source ─► SessionManager ─► FramePipeline ─► DetectionWorker
//!                                  │
//!                                  ▼
//!                             RealtimeHub ─► WebSocket / SSE viewers
//! ```

pub mod admission_controller;
pub mod batch_service;
pub mod detection_worker;
pub mod frame_pipeline;
pub mod media_server;
pub mod models;
pub mod network;
pub mod realtime_hub;
pub mod scratch_store;
pub mod session_manager;
pub mod upstream_link;
pub mod web_api;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
