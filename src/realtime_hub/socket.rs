//! WebSocket viewer adapter
//!
//! Frames go out as binary messages; everything else as JSON text with a
//! `type` tag.

use super::registry::ViewerRegistry;
use super::types::{DeliveryReport, HubMessage, StatusEvent, Transport};
use super::TransportAdapter;
use bytes::Bytes;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Payload queued for a WebSocket viewer
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPayload {
    Text(String),
    Binary(Bytes),
}

/// WebSocket transport adapter
pub struct SocketTransport {
    registry: ViewerRegistry<SocketPayload>,
}

impl SocketTransport {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            registry: ViewerRegistry::new(Transport::Socket, queue_depth),
        }
    }

    pub fn register(&self) -> (Uuid, mpsc::Receiver<SocketPayload>) {
        self.registry.register()
    }

    /// Wire encoding of a hub message for this transport
    pub fn encode(message: &HubMessage) -> SocketPayload {
        let value = match message {
            HubMessage::Frame(data) => return SocketPayload::Binary(data.clone()),
            HubMessage::Status(StatusEvent::SourceConnected { message: text })
            | HubMessage::Status(StatusEvent::SourceDisconnected { message: text }) => json!({
                "type": message.kind(),
                "message": text,
            }),
            HubMessage::Status(StatusEvent::Snapshot { phone_connected }) => json!({
                "type": "status",
                "phoneConnected": phone_connected,
            }),
            HubMessage::Detection(result) => json!({
                "type": "detections",
                "data": result,
            }),
            HubMessage::Error { message: text } => json!({
                "type": "error",
                "message": text,
            }),
        };
        SocketPayload::Text(value.to_string())
    }
}

impl TransportAdapter for SocketTransport {
    fn transport(&self) -> Transport {
        Transport::Socket
    }

    fn viewer_count(&self) -> usize {
        self.registry.len()
    }

    fn deliver(&self, message: &HubMessage) -> DeliveryReport {
        self.registry.fan_out(Self::encode(message))
    }

    fn deliver_to(&self, id: &Uuid, message: &HubMessage) -> bool {
        self.registry.send_to(id, Self::encode(message))
    }

    fn unregister(&self, id: &Uuid) -> bool {
        self.registry.unregister(id)
    }
}
