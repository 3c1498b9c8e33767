//! UpstreamLink - Outbound link to the external frame aggregator
//!
//! ## Responsibilities
//!
//! - Connect to the aggregator WebSocket with a bounded handshake
//! - Forward binary messages (frames) to the sink
//! - Report open/close to the sink; no automatic reconnection
//!
//! The session manager keeps at most one link and decides when to open or
//! close it.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

/// Default handshake timeout (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SEC: u64 = 10;

/// Receiver of upstream link events
pub trait UpstreamSink: Send + Sync + 'static {
    /// Handshake completed
    fn on_open(&self, link_id: Uuid);
    /// Binary frame received
    fn on_frame(&self, link_id: Uuid, frame: Bytes);
    /// Link ended. `was_open` is false when the handshake never completed.
    fn on_close(&self, link_id: Uuid, was_open: bool);
}

/// Handle to a running upstream link task
#[derive(Debug)]
pub struct UpstreamLink {
    id: Uuid,
    url: String,
    open: Arc<AtomicBool>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl UpstreamLink {
    /// Start connecting in the background
    pub fn spawn(url: String, connect_timeout: Duration, sink: Arc<dyn UpstreamSink>) -> Self {
        let id = Uuid::new_v4();
        let open = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tracing::info!(link_id = %id, url = %url, "Connecting to upstream stream");

        let task = tokio::spawn(run_link(
            id,
            url.clone(),
            connect_timeout,
            open.clone(),
            shutdown_rx,
            sink,
        ));

        Self {
            id,
            url,
            open,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Handshake done and not yet closed
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Connecting or open
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Ask the link to send a close frame and stop
    pub fn close(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tracing::info!(link_id = %self.id, "Upstream stream close requested");
    }
}

async fn run_link(
    id: Uuid,
    url: String,
    connect_timeout: Duration,
    open: Arc<AtomicBool>,
    mut shutdown: oneshot::Receiver<()>,
    sink: Arc<dyn UpstreamSink>,
) {
    let connect = tokio::select! {
        result = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str())) => result,
        _ = &mut shutdown => {
            tracing::info!(link_id = %id, "Upstream connect cancelled");
            sink.on_close(id, false);
            return;
        }
    };

    let ws = match connect {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            tracing::error!(link_id = %id, url = %url, error = %e, "Failed to connect to upstream stream");
            sink.on_close(id, false);
            return;
        }
        Err(_) => {
            tracing::error!(
                link_id = %id,
                url = %url,
                timeout_sec = connect_timeout.as_secs(),
                "Upstream connect timed out"
            );
            sink.on_close(id, false);
            return;
        }
    };

    open.store(true, Ordering::Release);
    tracing::info!(link_id = %id, "Connected to upstream stream");
    sink.on_open(id);

    let (mut writer, mut reader) = ws.split();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                if let Err(e) = writer.send(Message::Close(None)).await {
                    tracing::debug!(link_id = %id, error = %e, "Upstream close frame not sent");
                }
                break;
            }
            msg = reader.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(link_id = %id, bytes = data.len(), "Frame received from upstream");
                    sink.on_frame(id, Bytes::from(data));
                }
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(link_id = %id, message = %text, "Upstream text message");
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(link_id = %id, frame = ?frame, "Upstream stream closed by peer");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(link_id = %id, error = %e, "Upstream stream error");
                    break;
                }
                None => break,
            }
        }
    }

    open.store(false, Ordering::Release);
    tracing::info!(link_id = %id, "Upstream stream disconnected");
    sink.on_close(id, true);
}
