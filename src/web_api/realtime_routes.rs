//! Live stream endpoints
//!
//! - `GET /ws?type=phone` - camera source pushing binary JPEG frames
//! - `GET /ws` - viewer receiving frames (binary) and JSON events
//! - `GET /` - same as `/ws` for upgrade requests, static index otherwise
//! - `GET /events` - SSE viewer receiving named events

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, Request, State,
    },
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use bytes::Bytes;
use futures::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::realtime_hub::SocketPayload;
use crate::session_manager::{PeerConnection, PeerRole, SessionManager, ViewerCommand};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "type")]
    pub role: Option<String>,
}

// ========================================
// WebSocket Handler
// ========================================

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> Response {
    upgrade(ws, query, state)
}

/// Site root: upgrade requests join the stream, plain GETs get the frontend
pub async fn root_handler(
    ws: Option<WebSocketUpgrade>,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
    request: Request,
) -> Response {
    if let Some(ws) = ws {
        return upgrade(ws, query, state);
    }

    match ServeDir::new(&state.config.static_dir).oneshot(request).await {
        Ok(resp) => resp.into_response(),
        Err(never) => match never {},
    }
}

fn upgrade(ws: WebSocketUpgrade, query: StreamQuery, state: AppState) -> Response {
    let role = PeerRole::from_query(query.role.as_deref());
    tracing::info!(role = ?role, "New WebSocket connection");

    let session = state.session.clone();
    ws.on_upgrade(move |socket| async move {
        match role {
            PeerRole::Source => handle_source(socket, session).await,
            PeerRole::Viewer => handle_viewer(socket, session).await,
        }
    })
    .into_response()
}

/// Camera source: every binary message is a frame
async fn handle_source(mut socket: WebSocket, session: Arc<SessionManager>) {
    let peer = session.source_connected();

    while let Some(result) = socket.recv().await {
        match result {
            Ok(Message::Binary(data)) => {
                session.submit_frame(Bytes::from(data));
            }
            Ok(Message::Text(text)) => {
                tracing::info!(connection_id = %peer.id, message = %text, "Phone text message");
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!(connection_id = %peer.id, error = %e, "Phone connection error");
                break;
            }
            _ => {}
        }
    }

    session.source_disconnected(&peer.id);
}

/// Viewer: hub payloads out, control commands in
async fn handle_viewer(socket: WebSocket, session: Arc<SessionManager>) {
    let (mut sender, mut receiver) = socket.split();
    let (peer, mut rx) = session.register_socket_viewer();
    let conn_id = peer.id;

    // Spawn task to forward messages from hub to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            let msg = match payload {
                SocketPayload::Text(text) => Message::Text(text),
                SocketPayload::Binary(data) => Message::Binary(data.to_vec()),
            };
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let command_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    tracing::debug!(connection_id = %conn_id, message = %text, "Viewer message");
                    command_session.handle_command(ViewerCommand::parse(&text));
                }
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    session.unregister_viewer(&peer);
}

// ========================================
// SSE Handler
// ========================================

/// Unregisters an SSE viewer when its stream is dropped
struct EventViewerGuard {
    session: Arc<SessionManager>,
    peer: PeerConnection,
}

impl Drop for EventViewerGuard {
    fn drop(&mut self) {
        self.session.unregister_viewer(&self.peer);
    }
}

/// SSE viewer stream; the first event is the status snapshot
pub async fn event_stream_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (peer, rx) = state.session.register_event_viewer();
    let guard = EventViewerGuard {
        session: state.session.clone(),
        peer,
    };

    let stream = futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        let sse = Event::default().event(event.name).data(event.data);
        Some((Ok(sse), (rx, guard)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
