//! API Routes

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use futures::TryStreamExt;

use super::realtime_routes::{event_stream_handler, root_handler, websocket_handler};
use crate::error::{Error, Result};
use crate::media_server::MediaClass;
use crate::models::{DeleteResponse, FileEntry, UploadResponse};
use crate::state::AppState;

/// Multipart framing allowance on top of the file size limit
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(super::relay_status))
        .route("/api/local-ip", get(super::local_addresses))
        // Live stream
        .route("/", get(root_handler))
        .route("/ws", get(websocket_handler))
        .route("/events", get(event_stream_handler))
        // Media (byte-range)
        .route("/uploads/:filename", get(serve_upload))
        .route("/output/:filename", get(serve_output))
        // Batch
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/files", get(list_files))
        .route("/delete/:filename", delete(delete_file))
        .with_state(state)
}

// ========================================
// Media
// ========================================

async fn serve_upload(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    state
        .media
        .serve(MediaClass::Upload, &filename, headers.get(header::RANGE))
        .await
}

async fn serve_output(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    state
        .media
        .serve(MediaClass::Output, &filename, headers.get(header::RANGE))
        .await
}

// ========================================
// Batch
// ========================================

/// Accepts multipart field `file` and waits for the batch worker
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        tracing::info!(
            file = %original_name,
            content_type = ?content_type,
            "Upload received"
        );

        let staged = state
            .batch
            .stage(&original_name, content_type.as_deref(), field.map_err(Error::from))
            .await?;
        let response = state.batch.process(staged).await?;
        return Ok(Json(response));
    }

    Err(Error::Validation("No file uploaded".to_string()))
}

async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<FileEntry>>> {
    Ok(Json(state.batch.list_outputs().await?))
}

async fn delete_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<DeleteResponse>> {
    Ok(Json(state.batch.delete_output(&filename).await?))
}
