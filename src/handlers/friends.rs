//! Friend request endpoints.
//!
//! State changes are persisted first; if the counterpart has a live
//! connection the matching event is relayed to it through the same
//! single-writer discipline as message delivery. Delivery failure never
//! fails the request.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{debug, info};

use super::{bad_request, ErrorResponse, SuccessResponse};
use crate::config::AppState;
use crate::models::{FriendEvent, FriendEventKind};
use crate::relay::DeliveryOutcome;

#[derive(Debug, Deserialize)]
pub struct FriendRequestInput {
    /// Who sends (or originally sent) the friend request.
    pub from: String,
    /// Who receives (or is answering) it.
    pub to: String,
}

/// POST /send-friend-request
pub async fn send_friend_request(
    State(state): State<AppState>,
    payload: Result<Json<FriendRequestInput>, JsonRejection>,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Json(input) = payload.map_err(|_| bad_request("Bad request"))?;

    state
        .friends
        .send_request(&input.from, &input.to)
        .await
        .map_err(|err| bad_request(err.to_string()))?;

    // Tell the recipient who is asking, if they are online right now.
    if let Ok(Some(sender)) = state.users.find_by_id(&input.from).await {
        let event = FriendEvent::new(FriendEventKind::RequestReceived, sender);
        let outcome = state.router.deliver(&input.to, &event).await;
        if outcome != DeliveryOutcome::Delivered {
            debug!(to = %input.to, ?outcome, "friend request event not relayed");
        }
    }

    info!(from = %input.from, to = %input.to, "friend request sent");
    Ok(SuccessResponse::ok())
}

/// POST /accept-friend-request
pub async fn accept_friend_request(
    State(state): State<AppState>,
    payload: Result<Json<FriendRequestInput>, JsonRejection>,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Json(input) = payload.map_err(|_| bad_request("Bad request"))?;

    state
        .friends
        .accept_request(&input.from, &input.to)
        .await
        .map_err(|err| bad_request(err.to_string()))?;

    // Tell the original sender their request was accepted.
    if let Ok(Some(acceptor)) = state.users.find_by_id(&input.to).await {
        let event = FriendEvent::new(FriendEventKind::RequestAccepted, acceptor);
        let outcome = state.router.deliver(&input.from, &event).await;
        if outcome != DeliveryOutcome::Delivered {
            debug!(to = %input.from, ?outcome, "acceptance event not relayed");
        }
    }

    info!(from = %input.from, to = %input.to, "friend request accepted");
    Ok(SuccessResponse::ok())
}
