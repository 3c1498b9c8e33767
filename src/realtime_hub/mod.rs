//! RealtimeHub - WebSocket/SSE Distribution
//!
//! ## Responsibilities
//!
//! - Viewer registries, one per transport
//! - Fan-out of every hub message to every viewer on every transport
//! - Per-viewer isolation: one failed or slow viewer never affects the rest
//!
//! Transports plug in through `TransportAdapter`; the hub itself knows
//! nothing about wire encodings.

mod event_stream;
mod registry;
mod socket;
mod types;

pub use event_stream::{ChannelEvent, EventStreamTransport};
pub use registry::{ViewerRegistry, DEFAULT_VIEWER_QUEUE_DEPTH};
pub use socket::{SocketPayload, SocketTransport};
pub use types::*;

use std::sync::Arc;
use uuid::Uuid;

/// One viewer transport as seen by the hub
pub trait TransportAdapter: Send + Sync {
    fn transport(&self) -> Transport;

    fn viewer_count(&self) -> usize;

    /// Encode once and queue for every registered viewer
    fn deliver(&self, message: &HubMessage) -> DeliveryReport;

    /// Queue for one viewer only
    fn deliver_to(&self, id: &Uuid, message: &HubMessage) -> bool;

    fn unregister(&self, id: &Uuid) -> bool;
}

/// RealtimeHub instance
pub struct RealtimeHub {
    sockets: Arc<SocketTransport>,
    event_streams: Arc<EventStreamTransport>,
    adapters: Vec<Arc<dyn TransportAdapter>>,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new(queue_depth: usize) -> Self {
        let sockets = Arc::new(SocketTransport::new(queue_depth));
        let event_streams = Arc::new(EventStreamTransport::new(queue_depth));
        let adapters: Vec<Arc<dyn TransportAdapter>> = vec![sockets.clone(), event_streams.clone()];

        Self {
            sockets,
            event_streams,
            adapters,
        }
    }

    /// WebSocket viewers
    pub fn sockets(&self) -> &SocketTransport {
        &self.sockets
    }

    /// SSE viewers
    pub fn event_streams(&self) -> &EventStreamTransport {
        &self.event_streams
    }

    fn adapter(&self, transport: Transport) -> Option<&Arc<dyn TransportAdapter>> {
        self.adapters.iter().find(|a| a.transport() == transport)
    }

    /// Broadcast message to all viewers on all transports
    pub fn broadcast(&self, message: HubMessage) -> DeliveryReport {
        let report = self
            .adapters
            .iter()
            .map(|adapter| adapter.deliver(&message))
            .fold(DeliveryReport::default(), DeliveryReport::merge);

        tracing::debug!(
            message_type = message.kind(),
            delivered = report.delivered,
            lagged = report.lagged,
            removed = report.removed,
            "Broadcast to viewers"
        );

        report
    }

    /// Send message to a single viewer
    pub fn send_to(&self, transport: Transport, id: &Uuid, message: HubMessage) -> bool {
        self.adapter(transport)
            .map(|a| a.deliver_to(id, &message))
            .unwrap_or(false)
    }

    pub fn unregister(&self, transport: Transport, id: &Uuid) -> bool {
        self.adapter(transport).map(|a| a.unregister(id)).unwrap_or(false)
    }

    pub fn viewer_count(&self, transport: Transport) -> usize {
        self.adapter(transport).map(|a| a.viewer_count()).unwrap_or(0)
    }

    pub fn total_viewers(&self) -> usize {
        self.adapters.iter().map(|a| a.viewer_count()).sum()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(DEFAULT_VIEWER_QUEUE_DEPTH)
    }
}
