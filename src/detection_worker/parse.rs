//! Worker stdout decoding
//!
//! Frame mode prints one JSON document. Batch mode prints progress text and,
//! for schema-aware workers, one JSON stats line. Workers that predate the
//! schema print `Total frames: N` style lines only; those are still accepted.

use super::types::{BatchStats, Detection, DetectionCategory, DetectionResult};
use crate::error::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

/// Highest result schema version this server understands
pub const RESULT_SCHEMA_VERSION: u32 = 1;

static TOTAL_FRAMES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Total frames:[^\d\n]*(\d+)").expect("valid regex"));
static PET_ALERTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Pet alerts:[^\d\n]*(\d+)").expect("valid regex"));
static HUMANS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Humans detected:[^\d\n]*(\d+)").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct RawFrameDocument {
    #[serde(default)]
    schema_version: Option<u32>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    pets: Option<u32>,
    #[serde(default)]
    humans: Option<u32>,
    #[serde(default)]
    detections: Option<Vec<RawDetection>>,
}

impl RawFrameDocument {
    /// A result names counts or detections; an error document names `error`
    fn is_result(&self) -> bool {
        self.error.is_some()
            || self.pets.is_some()
            || self.humans.is_some()
            || self.detections.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    #[serde(rename = "type", alias = "category")]
    kind: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    bbox: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct RawBatchDocument {
    schema_version: u32,
    #[serde(default)]
    total_frames: u64,
    #[serde(default)]
    pet_alerts: u64,
    #[serde(default)]
    humans_detected: u64,
}

/// Decode frame-mode stdout into a `DetectionResult`.
///
/// The whole output is tried first, then each non-empty line from the end,
/// so log lines printed before the document are tolerated.
pub fn parse_frame_output(stdout: &str) -> Result<DetectionResult> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(Error::ResultParse("worker printed nothing".to_string()));
    }

    let decode = |s: &str| {
        serde_json::from_str::<RawFrameDocument>(s)
            .ok()
            .filter(RawFrameDocument::is_result)
    };
    let doc = decode(trimmed)
        .or_else(|| {
            trimmed
                .lines()
                .rev()
                .map(str::trim)
                .filter(|l| l.starts_with('{'))
                .find_map(decode)
        })
        .ok_or_else(|| Error::ResultParse(format!("no result document in: {}", truncate(trimmed))))?;

    if let Some(err) = doc.error {
        return Err(Error::ResultParse(format!("worker reported error: {}", err)));
    }
    if let Some(v) = doc.schema_version {
        if v > RESULT_SCHEMA_VERSION {
            return Err(Error::ResultParse(format!(
                "unsupported schema_version {} (max {})",
                v, RESULT_SCHEMA_VERSION
            )));
        }
    }

    let detections: Vec<Detection> = doc
        .detections
        .unwrap_or_default()
        .into_iter()
        .filter_map(|d| {
            let category = match d.kind.to_ascii_lowercase().as_str() {
                "pet" => DetectionCategory::Pet,
                "human" => DetectionCategory::Human,
                _ => return None,
            };
            let confidence = if d.confidence.is_finite() {
                d.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            let bbox = d
                .bbox
                .and_then(|b| <[f64; 4]>::try_from(b.as_slice()).ok());
            Some(Detection {
                category,
                label: d.label,
                confidence,
                bbox,
            })
        })
        .collect();

    let count = |c: DetectionCategory| detections.iter().filter(|d| d.category == c).count() as u32;
    let pets = doc.pets.unwrap_or_else(|| count(DetectionCategory::Pet));
    let humans = doc.humans.unwrap_or_else(|| count(DetectionCategory::Human));

    Ok(DetectionResult {
        pets,
        humans,
        detections,
    })
}

/// Decode batch-mode stdout into `BatchStats`. Never fails.
///
/// A JSON stats line carrying `schema_version` wins. Otherwise the labeled
/// text lines are scanned, and any label that is missing counts as 0.
pub fn parse_batch_output(stdout: &str) -> BatchStats {
    let structured = stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .filter_map(|l| serde_json::from_str::<RawBatchDocument>(l).ok())
        .find(|doc| doc.schema_version <= RESULT_SCHEMA_VERSION);

    if let Some(doc) = structured {
        return BatchStats {
            total_frames: doc.total_frames,
            pet_alerts: doc.pet_alerts,
            humans_detected: doc.humans_detected,
        };
    }

    parse_legacy_batch_output(stdout)
}

/// Pattern-based extraction for workers that only print progress text
pub fn parse_legacy_batch_output(stdout: &str) -> BatchStats {
    let last = |re: &Regex| {
        re.captures_iter(stdout)
            .filter_map(|c| c.get(1)?.as_str().parse::<u64>().ok())
            .last()
            .unwrap_or(0)
    };

    BatchStats {
        total_frames: last(&TOTAL_FRAMES_RE),
        pet_alerts: last(&PET_ALERTS_RE),
        humans_detected: last(&HUMANS_RE),
    }
}

fn truncate(s: &str) -> String {
    const MAX: usize = 200;
    match s.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
