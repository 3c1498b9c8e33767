//! MediaServer - Byte-range file delivery
//!
//! Serves uploaded originals (`/uploads/{file}`) and worker output
//! (`/output/{file}`) with `Range` support for seekable playback.
//! Bodies are streamed from disk, never buffered whole.

mod range;

pub use range::{parse_range, ByteRange};

use crate::error::{Error, Result};
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Which directory a file lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
    /// Original uploads
    Upload,
    /// Worker-produced output
    Output,
}

/// Content type by extension, `application/octet-stream` otherwise
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Reject anything that is not a plain file name
pub fn sanitize_filename(filename: &str) -> Result<&str> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains('\0');

    if invalid {
        return Err(Error::Validation(format!("Invalid filename: {}", filename)));
    }
    Ok(filename)
}

/// MediaServer instance
#[derive(Debug, Clone)]
pub struct MediaServer {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl MediaServer {
    /// Create new MediaServer
    pub fn new(upload_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            upload_dir,
            output_dir,
        }
    }

    pub fn dir(&self, class: MediaClass) -> &Path {
        match class {
            MediaClass::Upload => &self.upload_dir,
            MediaClass::Output => &self.output_dir,
        }
    }

    /// Stream `filename` from the class directory, honouring `range`
    pub async fn serve(
        &self,
        class: MediaClass,
        filename: &str,
        range: Option<&HeaderValue>,
    ) -> Result<Response> {
        let filename = sanitize_filename(filename)?;
        let path = self.dir(class).join(filename);

        let mut file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(filename.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(Error::NotFound(filename.to_string()));
        }
        let total = metadata.len();
        let content_type = content_type_for(filename);

        let range = match range.and_then(|v| v.to_str().ok()) {
            Some(value) => parse_range(value, total)?,
            None => None,
        };

        let builder = Response::builder()
            .header(header::CONTENT_TYPE, content_type)
            .header(header::ACCEPT_RANGES, "bytes");

        let response = match range {
            Some(range) => {
                tracing::debug!(
                    file = %filename,
                    start = range.start,
                    end = range.end,
                    total,
                    "Serving partial content"
                );
                file.seek(SeekFrom::Start(range.start)).await?;
                let stream = ReaderStream::new(file.take(range.len()));
                builder
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(header::CONTENT_RANGE, range.content_range(total))
                    .header(header::CONTENT_LENGTH, range.len())
                    .body(Body::from_stream(stream))
            }
            None => {
                tracing::debug!(file = %filename, total, "Serving full file");
                builder
                    .status(StatusCode::OK)
                    .header(header::CONTENT_LENGTH, total)
                    .body(Body::from_stream(ReaderStream::new(file)))
            }
        };

        response.map_err(|e| Error::Internal(format!("response build failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    async fn fixture() -> (tempfile::TempDir, MediaServer, Vec<u8>) {
        let tmp = tempfile::tempdir().unwrap();
        let uploads = tmp.path().join("uploads");
        let output = tmp.path().join("output");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::create_dir_all(&output).unwrap();

        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(output.join("clip.mp4"), &data).unwrap();

        (tmp, MediaServer::new(uploads, output), data)
    }

    async fn body_bytes(resp: Response) -> Vec<u8> {
        axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_range_0_99_of_1000() {
        let (_tmp, server, data) = fixture().await;
        let range = HeaderValue::from_static("bytes=0-99");

        let resp = server.serve(MediaClass::Output, "clip.mp4", Some(&range)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(resp.headers()[header::CONTENT_RANGE], "bytes 0-99/1000");
        assert_eq!(resp.headers()[header::CONTENT_LENGTH], "100");
        assert_eq!(resp.headers()[header::ACCEPT_RANGES], "bytes");
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(body_bytes(resp).await, &data[0..100]);
    }

    #[tokio::test]
    async fn test_full_file_without_range() {
        let (_tmp, server, data) = fixture().await;

        let resp = server.serve(MediaClass::Output, "clip.mp4", None).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_LENGTH], "1000");
        assert_eq!(resp.headers()[header::ACCEPT_RANGES], "bytes");
        assert_eq!(body_bytes(resp).await, data);
    }

    #[tokio::test]
    async fn test_tail_range() {
        let (_tmp, server, data) = fixture().await;
        let range = HeaderValue::from_static("bytes=990-");

        let resp = server.serve(MediaClass::Output, "clip.mp4", Some(&range)).await.unwrap();
        assert_eq!(resp.headers()[header::CONTENT_RANGE], "bytes 990-999/1000");
        assert_eq!(body_bytes(resp).await, &data[990..]);
    }

    #[tokio::test]
    async fn test_missing_file_is_404_json() {
        let (_tmp, server, _) = fixture().await;

        let err = server.serve(MediaClass::Upload, "clip.mp4", None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let (_tmp, server, _) = fixture().await;
        let range = HeaderValue::from_static("bytes=2000-");

        let err = server.serve(MediaClass::Output, "clip.mp4", Some(&range)).await.unwrap_err();
        assert!(matches!(err, Error::RangeNotSatisfiable { total: 1000 }));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (_tmp, server, _) = fixture().await;
        let err = server.serve(MediaClass::Output, "../secret", None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("a.MKV"), "video/x-matroska");
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("a.mov"), "video/quicktime");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
        assert_eq!(content_type_for("a.webm"), "application/octet-stream");
    }
}
