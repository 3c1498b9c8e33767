//! SessionManager types

use crate::admission_controller::AdmissionStatus;
use crate::realtime_hub::Transport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Peer role, selected by the `type` query parameter on connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerRole {
    /// Camera supplying raw frames
    Source,
    /// Consumer of processed frames and detections
    Viewer,
}

impl PeerRole {
    /// `phone` selects the source role; anything else is a viewer
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("phone") => PeerRole::Source,
            _ => PeerRole::Viewer,
        }
    }
}

/// One live peer connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerConnection {
    pub id: Uuid,
    pub role: PeerRole,
    pub transport: Transport,
    pub connected_at: DateTime<Utc>,
}

impl PeerConnection {
    pub fn new(id: Uuid, role: PeerRole, transport: Transport) -> Self {
        Self {
            id,
            role,
            transport,
            connected_at: Utc::now(),
        }
    }
}

/// Control command sent by a viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ViewerCommand {
    /// Open the upstream aggregator link
    #[serde(rename = "connect_phone")]
    ConnectSource,
    /// Close the upstream aggregator link
    #[serde(rename = "disconnect_phone")]
    DisconnectSource,
    #[serde(other)]
    Unknown,
}

impl ViewerCommand {
    /// Decode a viewer text message. Anything unrecognised is `Unknown`.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::warn!(error = %e, "Error parsing viewer message");
                ViewerCommand::Unknown
            }
        }
    }
}

/// Result of a connect request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamRequest {
    Started,
    /// Link already open or connecting
    AlreadyActive,
    /// No upstream URL configured
    NotConfigured,
}

/// Session snapshot (for `/api/status`)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub phone_connected: bool,
    pub upstream_connected: bool,
    pub socket_viewers: usize,
    pub event_viewers: usize,
    pub admission: AdmissionStatus,
}
