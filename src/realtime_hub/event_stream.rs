//! Server-Sent Events viewer adapter
//!
//! SSE carries text only, so frames are base64 encoded into a `frame`
//! event. Detection results go out as `prediction`.

use super::registry::ViewerRegistry;
use super::types::{DeliveryReport, HubMessage, StatusEvent, Transport};
use super::TransportAdapter;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Named event queued for an SSE viewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub name: &'static str,
    /// JSON payload
    pub data: String,
}

/// SSE transport adapter
pub struct EventStreamTransport {
    registry: ViewerRegistry<ChannelEvent>,
}

impl EventStreamTransport {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            registry: ViewerRegistry::new(Transport::EventStream, queue_depth),
        }
    }

    pub fn register(&self) -> (Uuid, mpsc::Receiver<ChannelEvent>) {
        self.registry.register()
    }

    /// Wire encoding of a hub message for this transport
    pub fn encode(message: &HubMessage) -> ChannelEvent {
        let (name, data) = match message {
            HubMessage::Status(StatusEvent::SourceConnected { message: text }) => {
                ("phone_connected", json!({ "message": text }))
            }
            HubMessage::Status(StatusEvent::SourceDisconnected { message: text }) => {
                ("phone_disconnected", json!({ "message": text }))
            }
            HubMessage::Status(StatusEvent::Snapshot { phone_connected }) => {
                ("status", json!({ "phoneConnected": phone_connected }))
            }
            HubMessage::Frame(data) => ("frame", json!({ "image": BASE64.encode(data) })),
            HubMessage::Detection(result) => ("prediction", json!(result)),
            HubMessage::Error { message: text } => ("error", json!({ "message": text })),
        };

        ChannelEvent {
            name,
            data: data.to_string(),
        }
    }
}

impl TransportAdapter for EventStreamTransport {
    fn transport(&self) -> Transport {
        Transport::EventStream
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
