//! Shared API models
//!
//! Response bodies used by more than one module. Field names follow the
//! JSON the browser client expects (camelCase).

use crate::detection_worker::BatchStats;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Media kind of an uploaded or processed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
}

impl FileType {
    /// Image for jpg/jpeg/png/gif, video otherwise
    pub fn from_extension(filename: &str) -> Self {
        let ext = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("jpg" | "jpeg" | "png" | "gif") => FileType::Image,
            _ => FileType::Video,
        }
    }

    /// Declared MIME type wins (`image/*` is an image); extension otherwise
    pub fn detect(content_type: Option<&str>, filename: &str) -> Self {
        match content_type {
            Some(ct) if ct.starts_with("image") => FileType::Image,
            Some(ct) if ct.starts_with("video") => FileType::Video,
            _ => Self::from_extension(filename),
        }
    }
}

/// Entry of `GET /files`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
}

/// Successful `POST /upload` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub original_file: String,
    pub output_file: String,
    pub output_url: String,
    pub file_type: FileType,
    pub stats: BatchStats,
}

/// `DELETE /delete/{filename}` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}
