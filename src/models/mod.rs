//! Wire and storage types shared across the relay and the REST surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A socket frame relayed between two users.
///
/// `id` carries the *sender* identity; `to` is the routing key and must be
/// non-empty for a frame to be routable. Frames are pure transient relay:
/// they carry no storage identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub timestamp: i64,
    pub message: String,
    /// Sender identity.
    pub id: String,
    /// Recipient identity; the routing key.
    pub to: String,
}

/// A durable message record.
///
/// The JSON shape is what clients already consume: `_id`, `createdAt` and
/// `expireAt` in RFC 3339. Records expire a week after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub message: String,
    pub title: Option<String>,
    pub from: String,
    pub to: String,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
}

/// Public user record: the only user fields the API ever returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub email: String,
    #[serde(rename = "_id")]
    pub id: String,
}

/// Event pushed to a live connection when friend state changes.
#[derive(Debug, Clone, Serialize)]
pub struct FriendEvent {
    #[serde(rename = "type")]
    pub kind: FriendEventKind,
    pub email: String,
    #[serde(rename = "_id")]
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FriendEventKind {
    RequestReceived,
    RequestAccepted,
}

impl FriendEvent {
    pub fn new(kind: FriendEventKind, user: UserSummary) -> Self {
        Self {
            kind,
            email: user.email,
            user_id: user.id,
        }
    }
}
