//! WebAPI - HTTP, WebSocket and SSE endpoints
//!
//! ## Responsibilities
//!
//! - Route table
//! - Request decoding (multipart, path, range header, query)
//! - Response formatting

mod realtime_routes;
mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::network::LocalAddresses;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse::ok())
}

/// Relay status: source link, viewers, admission counters
pub async fn relay_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.session.status())
}

/// LAN addresses and the source URL for a phone on the same network
pub async fn local_addresses(State(state): State<AppState>) -> impl IntoResponse {
    Json(LocalAddresses::discover(state.config.port))
}
