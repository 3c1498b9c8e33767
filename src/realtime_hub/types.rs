//! RealtimeHub types

use crate::detection_worker::DetectionResult;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Viewer transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Bidirectional WebSocket carrying raw binary frames
    Socket,
    /// Server-Sent Events carrying named, text-only events
    EventStream,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Socket => "socket",
            Transport::EventStream => "event_stream",
        }
    }
}

/// Source link status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    SourceConnected { message: String },
    SourceDisconnected { message: String },
    /// Point-in-time snapshot, sent to a single viewer on connect
    Snapshot { phone_connected: bool },
}

/// Hub message, delivered identically to every transport adapter
#[derive(Debug, Clone)]
pub enum HubMessage {
    Status(StatusEvent),
    /// Processed (annotated) JPEG bytes
    Frame(Bytes),
    Detection(DetectionResult),
    Error { message: String },
}

impl HubMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            HubMessage::Status(StatusEvent::SourceConnected { .. }) => "phone_connected",
            HubMessage::Status(StatusEvent::SourceDisconnected { .. }) => "phone_disconnected",
            HubMessage::Status(StatusEvent::Snapshot { .. }) => "status",
            HubMessage::Frame(_) => "frame",
            HubMessage::Detection(_) => "detections",
            HubMessage::Error { .. } => "error",
        }
    }
}

/// Outcome of one fan-out on one transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Viewers the message was queued for
    pub delivered: usize,
    /// Viewers skipped because their queue was full
    pub lagged: usize,
    /// Viewers found closed and unregistered
    pub removed: usize,
}

impl DeliveryReport {
    pub fn merge(self, other: DeliveryReport) -> DeliveryReport {
        DeliveryReport {
            delivered: self.delivered + other.delivered,
            lagged: self.lagged + other.lagged,
            removed: self.removed + other.removed,
        }
    }
}
