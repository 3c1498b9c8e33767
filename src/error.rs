//! Error handling for the relay server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Requested file does not exist
    #[error("File not found: {0}")]
    NotFound(String),

    /// Bad request input (filename, upload type, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upload exceeds the configured size limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Range header cannot be satisfied for a file of `total` bytes
    #[error("Range not satisfiable (file size {total})")]
    RangeNotSatisfiable { total: u64 },

    /// Worker exited non-zero, timed out, or could not be spawned
    #[error("Processing failed: {details}")]
    WorkerFailed { details: String },

    /// Worker exited 0 but the declared output artifact is absent
    #[error("Output file not generated")]
    MissingOutput { details: String },

    /// Worker stdout could not be decoded into a result document
    #[error("Result parse error: {0}")]
    ResultParse(String),

    /// Multipart decoding error
    #[error("Multipart error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message, details) = match &self {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "File not found".to_string(), None),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            Error::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone(), None),
            Error::RangeNotSatisfiable { total } => {
                let body = Json(json!({ "error": "Range not satisfiable" }));
                return (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    [(axum::http::header::CONTENT_RANGE, format!("bytes */{}", total))],
                    body,
                )
                    .into_response();
            }
            Error::WorkerFailed { details } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Processing failed".to_string(),
                Some(details.clone()),
            ),
            Error::MissingOutput { details } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Output file not generated".to_string(),
                Some(details.clone()),
            ),
            Error::ResultParse(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Result parse error".to_string(),
                Some(msg.clone()),
            ),
            Error::Multipart(e) => (e.status(), e.body_text(), None),
            Error::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), None),
            Error::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), None),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, message = %message, details = ?details, "Request error");
        } else {
            tracing::debug!(status = %status, message = %message, "Request rejected");
        }

        let body = match details {
            Some(details) => Json(json!({ "error": message, "details": details })),
            None => Json(json!({ "error": message })),
        };

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::NotFound("a.mp4".into()), StatusCode::NOT_FOUND),
            (Error::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (
                Error::WorkerFailed { details: "boom".into() },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::MissingOutput { details: String::new() },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::RangeNotSatisfiable { total: 10 },
                StatusCode::RANGE_NOT_SATISFIABLE,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_range_error_carries_content_range() {
        let resp = Error::RangeNotSatisfiable { total: 1000 }.into_response();
        assert_eq!(
            resp.headers().get(axum::http::header::CONTENT_RANGE).unwrap(),
            "bytes */1000"
        );
    }
}
