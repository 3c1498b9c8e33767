//! SessionManager - Connection & Role Management
//!
//! ## Responsibilities
//!
//! - Track the single source link (direct camera or upstream aggregator)
//! - Register viewers on either transport and send them a status snapshot
//! - Decode viewer control commands and open/close the upstream link
//! - Hand source frames to the frame pipeline
//!
//! ## Source tracking
//!
//! Every source connection gets a fresh id. A newer source replaces the
//! tracked one without closing it; a disconnect only clears the link when
//! it comes from the tracked id.

mod types;

pub use types::*;

use crate::frame_pipeline::{FramePipeline, Submission};
use crate::realtime_hub::{
    ChannelEvent, HubMessage, RealtimeHub, SocketPayload, StatusEvent, Transport,
};
use crate::upstream_link::{UpstreamLink, UpstreamSink, DEFAULT_CONNECT_TIMEOUT_SEC};
use bytes::Bytes;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Upstream aggregator settings
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// WebSocket URL; `None` disables the link
    pub url: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SEC),
        }
    }
}

/// SessionManager instance
pub struct SessionManager {
    hub: Arc<RealtimeHub>,
    pipeline: Arc<FramePipeline>,
    source: RwLock<Option<PeerConnection>>,
    upstream: Mutex<Option<UpstreamLink>>,
    upstream_config: UpstreamConfig,
}

impl SessionManager {
    /// Create new SessionManager
    pub fn new(
        hub: Arc<RealtimeHub>,
        pipeline: Arc<FramePipeline>,
        upstream_config: UpstreamConfig,
    ) -> Self {
        Self {
            hub,
            pipeline,
            source: RwLock::new(None),
            upstream: Mutex::new(None),
            upstream_config,
        }
    }

    pub fn hub(&self) -> &RealtimeHub {
        &self.hub
    }

    pub fn pipeline(&self) -> &Arc<FramePipeline> {
        &self.pipeline
    }

    // ========================================
    // Source link
    // ========================================

    /// A direct source connected. Becomes the tracked link.
    pub fn source_connected(&self) -> PeerConnection {
        let peer = PeerConnection::new(Uuid::new_v4(), PeerRole::Source, Transport::Socket);

        let previous = self
            .source
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(peer.clone());
        if let Some(previous) = previous {
            tracing::warn!(
                connection_id = %peer.id,
                replaced = %previous.id,
                "New source replaces tracked source link"
            );
        }

        tracing::info!(connection_id = %peer.id, "Phone connected");
        self.hub.broadcast(HubMessage::Status(StatusEvent::SourceConnected {
            message: "Phone connected".to_string(),
        }));

        peer
    }

    /// A direct source disconnected. Returns false for a stale id.
    /// Viewers hear about it only when no upstream link is still feeding.
    pub fn source_disconnected(&self, id: &Uuid) -> bool {
        {
            let mut source = self.source.write().unwrap_or_else(PoisonError::into_inner);
            match source.as_ref() {
                Some(tracked) if tracked.id == *id => {
                    *source = None;
                }
                _ => {
                    tracing::info!(connection_id = %id, "Stale source disconnected, ignoring");
                    return false;
                }
            }
        }

        tracing::info!(connection_id = %id, "Phone disconnected");
        if !self.is_source_connected() {
            self.hub.broadcast(HubMessage::Status(StatusEvent::SourceDisconnected {
                message: "Phone disconnected".to_string(),
            }));
        }
        true
    }

    fn has_direct_source(&self) -> bool {
        self.source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Frame from any source
    pub fn submit_frame(&self, frame: Bytes) -> Submission {
        tracing::debug!(bytes = frame.len(), "Frame received from phone");
        self.pipeline.submit(frame)
    }

    /// Direct source or open upstream link
    pub fn is_source_connected(&self) -> bool {
        self.has_direct_source() || self.is_upstream_open()
    }

    pub fn tracked_source(&self) -> Option<PeerConnection> {
        self.source.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    // ========================================
    // Viewers
    // ========================================

    /// Register a WebSocket viewer; the status snapshot is already queued
    pub fn register_socket_viewer(&self) -> (PeerConnection, mpsc::Receiver<SocketPayload>) {
        let (id, rx) = self.hub.sockets().register();
        let peer = PeerConnection::new(id, PeerRole::Viewer, Transport::Socket);
        self.send_snapshot(&peer);
        (peer, rx)
    }

    /// Register an SSE viewer; the status snapshot is already queued
    pub fn register_event_viewer(&self) -> (PeerConnection, mpsc::Receiver<ChannelEvent>) {
        let (id, rx) = self.hub.event_streams().register();
        let peer = PeerConnection::new(id, PeerRole::Viewer, Transport::EventStream);
        self.send_snapshot(&peer);
        (peer, rx)
    }

    fn send_snapshot(&self, peer: &PeerConnection) {
        let phone_connected = self.is_source_connected();
        self.hub.send_to(
            peer.transport,
            &peer.id,
            HubMessage::Status(StatusEvent::Snapshot { phone_connected }),
        );
        tracing::debug!(
            connection_id = %peer.id,
            transport = peer.transport.as_str(),
            phone_connected,
            "Status snapshot sent"
        );
    }

    /// Idempotent; a viewer pruned during fan-out may already be gone
    pub fn unregister_viewer(&self, peer: &PeerConnection) -> bool {
        self.hub.unregister(peer.transport, &peer.id)
    }

    /// Apply a decoded viewer command
    pub fn handle_command(self: &Arc<Self>, command: ViewerCommand) {
        match command {
            ViewerCommand::ConnectSource => {
                tracing::info!("Viewer requested upstream phone connection");
                self.connect_upstream();
            }
            ViewerCommand::DisconnectSource => {
                tracing::info!("Viewer requested phone disconnection");
                self.disconnect_upstream();
            }
            ViewerCommand::Unknown => {
                tracing::debug!("Unknown viewer command ignored");
            }
        }
    }

    // ========================================
    // Upstream link
    // ========================================

    /// Open the upstream link unless one is already open or connecting
    pub fn connect_upstream(self: &Arc<Self>) -> UpstreamRequest {
        let Some(url) = self.upstream_config.url.clone() else {
            tracing::warn!("Upstream connect requested but no URL configured");
            self.hub.broadcast(HubMessage::Error {
                message: "Upstream phone stream is not configured".to_string(),
            });
            return UpstreamRequest::NotConfigured;
        };

        let mut upstream = self.upstream.lock().unwrap_or_else(PoisonError::into_inner);
        if upstream.as_ref().is_some_and(|link| link.is_active()) {
            tracing::info!("Already connected to upstream phone stream");
            return UpstreamRequest::AlreadyActive;
        }

        let sink: Arc<dyn UpstreamSink> = self.clone();
        *upstream = Some(UpstreamLink::spawn(
            url,
            self.upstream_config.connect_timeout,
            sink,
        ));
        UpstreamRequest::Started
    }

    /// Close the upstream link. Returns false when there was none.
    ///
    /// The link is detached before it finishes closing, so its own close
    /// callback is stale; the disconnect is announced here instead.
    pub fn disconnect_upstream(&self) -> bool {
        let link = self
            .upstream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(link) = link else {
            return false;
        };

        let was_open = link.is_open();
        link.close();

        if was_open && !self.has_direct_source() {
            self.hub.broadcast(HubMessage::Status(StatusEvent::SourceDisconnected {
                message: "Phone stream disconnected".to_string(),
            }));
        }
        true
    }

    pub fn is_upstream_open(&self) -> bool {
        self.upstream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|link| link.is_open())
    }

    fn is_tracked_upstream(&self, link_id: Uuid) -> bool {
        self.upstream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|link| link.id() == link_id)
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phone_connected: self.is_source_connected(),
            upstream_connected: self.is_upstream_open(),
            socket_viewers: self.hub.viewer_count(Transport::Socket),
            event_viewers: self.hub.viewer_count(Transport::EventStream),
            admission: self.pipeline.admission().status(),
        }
    }
}

impl UpstreamSink for SessionManager {
    fn on_open(&self, link_id: Uuid) {
        if !self.is_tracked_upstream(link_id) {
            tracing::debug!(link_id = %link_id, "Detached upstream link opened, ignoring");
            return;
        }
        tracing::info!(link_id = %link_id, "Upstream phone stream connected");
        self.hub.broadcast(HubMessage::Status(StatusEvent::SourceConnected {
            message: "Phone stream connected".to_string(),
        }));
    }

    fn on_frame(&self, link_id: Uuid, frame: Bytes) {
        if !self.is_tracked_upstream(link_id) {
            tracing::debug!(link_id = %link_id, "Frame from detached upstream link dropped");
            return;
        }
        self.submit_frame(frame);
    }

    fn on_close(&self, link_id: Uuid, was_open: bool) {
        {
            let mut upstream = self.upstream.lock().unwrap_or_else(PoisonError::into_inner);
            if !upstream.as_ref().is_some_and(|link| link.id() == link_id) {
                tracing::debug!(link_id = %link_id, "Detached upstream link closed, ignoring");
                return;
            }
            *upstream = None;
        }

        if was_open {
            if self.has_direct_source() {
                return;
            }
            self.hub.broadcast(HubMessage::Status(StatusEvent::SourceDisconnected {
                message: "Phone stream disconnected".to_string(),
            }));
        } else {
            self.hub.broadcast(HubMessage::Error {
                message: "Failed to connect to upstream phone stream".to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission_controller::AdmissionController;
    use crate::detection_worker::{testing::script_worker, DetectionWorker};
    use crate::scratch_store::ScratchStore;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    async fn manager(dir: &std::path::Path, url: Option<String>) -> Arc<SessionManager> {
        let hub = Arc::new(RealtimeHub::default());
        let scratch = Arc::new(ScratchStore::new(dir.join("scratch")).await.unwrap());
        let worker = Arc::new(DetectionWorker::new(script_worker(
            dir,
            "worker.sh",
            "echo '{\"pets\":0,\"humans\":0,\"detections\":[]}'",
        )));
        let pipeline = Arc::new(FramePipeline::new(
            Arc::new(AdmissionController::new(3)),
            scratch,
            worker,
            hub.clone(),
        ));
        Arc::new(SessionManager::new(
            hub,
            pipeline,
            UpstreamConfig {
                url,
                connect_timeout: Duration::from_secs(2),
            },
        ))
    }

    fn socket_kind(payload: SocketPayload) -> String {
        match payload {
            SocketPayload::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                value["type"].as_str().unwrap().to_string()
            }
            SocketPayload::Binary(_) => "binary".to_string(),
        }
    }

    #[tokio::test]
    async fn test_viewer_receives_snapshot_then_status_changes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), None).await;

        let (_viewer, mut rx) = manager.register_socket_viewer();
        let Some(SocketPayload::Text(snapshot)) = rx.recv().await else {
            panic!("expected status snapshot");
        };
        let snapshot: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(snapshot["type"], "status");
        assert_eq!(snapshot["phoneConnected"], false);

        let source = manager.source_connected();
        assert!(manager.is_source_connected());
        assert_eq!(socket_kind(rx.recv().await.unwrap()), "phone_connected");

        assert!(manager.source_disconnected(&source.id));
        assert!(!manager.is_source_connected());
        assert_eq!(socket_kind(rx.recv().await.unwrap()), "phone_disconnected");
    }

    #[tokio::test]
    async fn test_event_viewer_snapshot_reflects_source() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), None).await;
        manager.source_connected();

        let (_viewer, mut rx) = manager.register_event_viewer();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "status");
        assert_eq!(event.data, r#"{"phoneConnected":true}"#);
    }

    #[tokio::test]
    async fn test_stale_source_disconnect_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), None).await;

        let first = manager.source_connected();
        let second = manager.source_connected();
        let (_viewer, mut rx) = manager.register_socket_viewer();
        rx.recv().await.unwrap();

        assert!(!manager.source_disconnected(&first.id));
        assert!(manager.is_source_connected());
        assert_eq!(manager.tracked_source().map(|p| p.id), Some(second.id));
        assert!(rx.try_recv().is_err());

        assert!(manager.source_disconnected(&second.id));
        assert!(!manager.is_source_connected());
    }

    #[tokio::test]
    async fn test_unregistered_viewer_gets_nothing_further() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), None).await;

        let (viewer, mut rx) = manager.register_socket_viewer();
        let (_other, mut other_rx) = manager.register_socket_viewer();
        rx.recv().await.unwrap();
        other_rx.recv().await.unwrap();

        manager.unregister_viewer(&viewer);
        assert_eq!(manager.status().socket_viewers, 1);

        manager.source_connected();
        assert!(rx.recv().await.is_none());
        assert_eq!(socket_kind(other_rx.recv().await.unwrap()), "phone_connected");
    }

    #[tokio::test]
    async fn test_connect_without_url_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), None).await;
        let (_viewer, mut rx) = manager.register_event_viewer();
        rx.recv().await.unwrap();

        assert_eq!(manager.connect_upstream(), UpstreamRequest::NotConfigured);
        assert_eq!(rx.recv().await.unwrap().name, "error");
        assert!(!manager.disconnect_upstream());
    }

    #[tokio::test]
    async fn test_upstream_link_acts_as_source() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (close_tx, close_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Binary(b"jpeg".to_vec())).await.unwrap();
            let _ = close_rx.await;
            ws.close(None).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), Some(format!("ws://{}", addr))).await;
        let (_viewer, mut rx) = manager.register_socket_viewer();
        rx.recv().await.unwrap();

        assert_eq!(manager.connect_upstream(), UpstreamRequest::Started);
        assert_eq!(manager.connect_upstream(), UpstreamRequest::AlreadyActive);

        assert_eq!(socket_kind(rx.recv().await.unwrap()), "phone_connected");
        assert!(manager.is_source_connected());
        assert!(manager.status().upstream_connected);

        // Frame from upstream flows through the pipeline
        assert_eq!(socket_kind(rx.recv().await.unwrap()), "binary");
        assert_eq!(socket_kind(rx.recv().await.unwrap()), "detections");

        close_tx.send(()).unwrap();
        assert_eq!(socket_kind(rx.recv().await.unwrap()), "phone_disconnected");
        assert!(!manager.is_source_connected());
    }

    #[tokio::test]
    async fn test_detached_upstream_link_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), None).await;
        let (_viewer, mut rx) = manager.register_socket_viewer();
        rx.recv().await.unwrap();

        let detached = Uuid::new_v4();
        manager.on_open(detached);
        manager.on_frame(detached, Bytes::from_static(b"jpeg"));
        manager.on_close(detached, true);
        manager.on_close(detached, false);

        assert_eq!(manager.status().admission.admitted, 0);
        assert!(!manager.is_source_connected());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_source_disconnect_silent_while_upstream_feeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), Some(format!("ws://{}", addr))).await;
        let (_viewer, mut rx) = manager.register_socket_viewer();
        rx.recv().await.unwrap();

        manager.connect_upstream();
        assert_eq!(socket_kind(rx.recv().await.unwrap()), "phone_connected");

        let direct = manager.source_connected();
        assert_eq!(socket_kind(rx.recv().await.unwrap()), "phone_connected");
        assert!(manager.source_disconnected(&direct.id));
        assert!(manager.is_source_connected());
        assert!(rx.try_recv().is_err());

        // upstream goes away while a direct source is tracked: still connected
        let direct = manager.source_connected();
        assert_eq!(socket_kind(rx.recv().await.unwrap()), "phone_connected");
        assert!(manager.disconnect_upstream());
        assert!(manager.is_source_connected());
        assert!(rx.try_recv().is_err());

        assert!(manager.source_disconnected(&direct.id));
        assert_eq!(socket_kind(rx.recv().await.unwrap()), "phone_disconnected");
        assert!(!manager.is_source_connected());
    }

    #[tokio::test]
    async fn test_handle_command_disconnects_upstream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), Some(format!("ws://{}", addr))).await;
        let (_viewer, mut rx) = manager.register_socket_viewer();
        rx.recv().await.unwrap();

        manager.handle_command(ViewerCommand::ConnectSource);
        assert_eq!(socket_kind(rx.recv().await.unwrap()), "phone_connected");

        manager.handle_command(ViewerCommand::DisconnectSource);
        assert_eq!(socket_kind(rx.recv().await.unwrap()), "phone_disconnected");
        assert!(!manager.status().upstream_connected);
    }
}
