//! A live, user-bound handle to one WebSocket transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message as WsMessage;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use uuid::Uuid;

/// Outbound frames buffered per connection before writes start failing.
pub const FRAME_QUEUE_CAPACITY: usize = 32;

/// Upper bound on how long a single write may wait for queue space; a peer
/// slower than this is treated as dead.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a write to a connection did not complete.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("transport closed")]
    Closed,
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
    #[error("payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Handle to one live WebSocket bound to a single user identity.
///
/// The writer task spawned by the WebSocket handler is the sole owner of
/// the socket sink; everyone else reaches the socket through the bounded
/// frame queue, so writes on one connection never interleave no matter how
/// many tasks are sending.
#[derive(Clone)]
pub struct Connection {
    user_id: String,
    id: Uuid,
    frames: mpsc::Sender<WsMessage>,
    shared: Arc<Shared>,
}

struct Shared {
    closed: AtomicBool,
    last_seen: Mutex<DateTime<Utc>>,
}

impl Connection {
    pub fn new(user_id: impl Into<String>, frames: mpsc::Sender<WsMessage>) -> Self {
        Self {
            user_id: user_id.into(),
            id: Uuid::new_v4(),
            frames,
            shared: Arc::new(Shared {
                closed: AtomicBool::new(false),
                last_seen: Mutex::new(Utc::now()),
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Per-accept identity; a reconnect gets a fresh one.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Serialize `payload` and queue it as one text frame, waiting at most
    /// [`WRITE_TIMEOUT`] for queue space.
    pub async fn send_json<T: Serialize>(&self, payload: &T) -> Result<(), SendError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        let text = serde_json::to_string(payload)?;
        match self
            .frames
            .send_timeout(WsMessage::Text(text.into()), WRITE_TIMEOUT)
            .await
        {
            Ok(()) => {
                self.touch();
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => Err(SendError::Timeout(WRITE_TIMEOUT)),
            Err(SendTimeoutError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Queue a raw protocol frame (pong replies) without waiting. Returns
    /// whether the frame was accepted.
    pub fn send_raw(&self, frame: WsMessage) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            return false;
        }
        self.frames.try_send(frame).is_ok()
    }

    /// Record transport activity. Diagnostics only.
    pub fn touch(&self) {
        *self.shared.last_seen.lock() = Utc::now();
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        *self.shared.last_seen.lock()
    }

    /// Ask the writer task to close the socket. Idempotent: the close frame
    /// is queued exactly once, best-effort, so a stuck peer cannot block
    /// the caller.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            let _ = self.frames.try_send(WsMessage::Close(None));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}
