//! Detection worker result types

use serde::{Deserialize, Serialize};

/// Class of a detected object
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DetectionCategory {
    Pet,
    Human,
}

/// Single detection in a frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    #[serde(rename = "type")]
    pub category: DetectionCategory,
    pub label: String,
    /// Always within [0, 1]
    pub confidence: f64,
    /// [x1, y1, x2, y2] in source pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
}

/// Per-frame detection result, broadcast to viewers as-is
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DetectionResult {
    pub pets: u32,
    pub humans: u32,
    pub detections: Vec<Detection>,
}

/// Aggregate counters reported by a batch run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub total_frames: u64,
    pub pet_alerts: u64,
    pub humans_detected: u64,
}

/// Frame-mode outcome for a worker that exited 0
#[derive(Debug)]
pub struct FrameOutcome {
    /// Annotated image read back from the scratch file
    pub image: bytes::Bytes,
    /// Parsed stdout; `Err` means the frame counts as processed with no detections
    pub result: crate::Result<DetectionResult>,
}

/// Batch-mode outcome for a worker that exited 0 and wrote its output
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub stats: BatchStats,
    pub stdout: String,
}
