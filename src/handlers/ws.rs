//! WebSocket endpoint and the per-connection handler.
//!
//! One task per accepted socket runs the receive loop; a second task owns
//! the sink and drains the connection's frame queue, so nothing else ever
//! writes to the socket directly.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{AppState, RelayConfig};
use crate::models::WireMessage;
use crate::relay::connection::{Connection, FRAME_QUEUE_CAPACITY};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// The connecting user's identity.
    pub id: String,
}

/// GET /ws?id=<user>
///
/// Upgrades to the persistent duplex connection. The origin must be on the
/// allow-list unless the local development flag accepts everything.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !origin_allowed(&state.config, &headers) {
        warn!("WebSocket upgrade rejected: origin not allowed");
        return StatusCode::FORBIDDEN.into_response();
    }
    if params.id.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    ws.on_upgrade(move |socket| run_connection(socket, state, params.id))
}

fn origin_allowed(config: &RelayConfig, headers: &HeaderMap) -> bool {
    if config.local_dev {
        return true;
    }
    let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    config.allowed_origins.iter().any(|allowed| allowed == origin)
}

/// Per-connection handler: register, receive frames until the transport
/// fails or closes, unregister.
async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (sink, stream) = socket.split();
    let (frames, outbound) = mpsc::channel(FRAME_QUEUE_CAPACITY);

    let conn = Connection::new(&user_id, frames);
    let conn_id = conn.id();
    let writer = tokio::spawn(write_frames(sink, outbound));

    state.registry.register(conn.clone());
    info!(user = %user_id, connections = state.registry.len(), "connection active");

    read_frames(stream, &state, &conn).await;

    // Guarded: if a reconnect already replaced us this is a no-op.
    state.registry.unregister(&user_id, conn_id);
    conn.close();
    writer.abort();

    info!(user = %user_id, "connection closed");
}

/// Receive loop: one frame at a time until error or close. Decoded frames
/// are handed to the router fire-and-forget; relay is best-effort and the
/// sender learns nothing about delivery.
async fn read_frames(mut stream: SplitStream<WebSocket>, state: &AppState, conn: &Connection) {
    let user_id = conn.user_id();
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                conn.touch();
                match serde_json::from_str::<WireMessage>(&text) {
                    Ok(msg) if msg.to.is_empty() => {
                        warn!(user = %user_id, "frame without recipient dropped");
                    }
                    Ok(msg) => state.router.submit(msg),
                    Err(err) => {
                        warn!(user = %user_id, error = %err, "undecodable frame, closing");
                        break;
                    }
                }
            }
            Ok(WsMessage::Ping(data)) => {
                conn.send_raw(WsMessage::Pong(data));
            }
            Ok(WsMessage::Close(_)) => {
                info!(user = %user_id, "client closed connection");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(user = %user_id, error = %err, "transport error");
                break;
            }
        }
    }
}

/// Writer task: sole owner of the socket sink.
async fn write_frames(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut outbound: mpsc::Receiver<WsMessage>,
) {
    while let Some(frame) = outbound.recv().await {
        if sink.send(frame).await.is_err() {
            break;
        }
    }
}
