//! HTTP and WebSocket handlers for the relay server.

pub mod friends;
pub mod messages;
pub mod users;
pub mod ws;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

// Re-export AppState from config
pub use crate::config::AppState;

// WebSocket endpoint
pub use ws::ws_upgrade;

// Message handlers
pub use messages::{get_messages, save_message};

// User directory handlers
pub use users::{
    add_user_contact, get_user_contacts, get_user_id, query_contacts, sign_in, update_user,
    update_user_token,
};

// Friend request handlers
pub use friends::{accept_friend_request, send_friend_request};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

/// 400 with the `{"error": ...}` payload clients expect.
pub(crate) fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}
