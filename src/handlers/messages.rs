//! Message submission and retrieval over the request path.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::{bad_request, ErrorResponse};
use crate::config::AppState;
use crate::models::StoredMessage;
use crate::relay::DeliveryOutcome;

#[derive(Debug, Deserialize)]
pub struct SaveMessageInput {
    pub message: String,
    #[serde(default)]
    pub title: Option<String>,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesInput {
    #[serde(default)]
    pub retrieve_before_index: bool,
    #[serde(default)]
    pub index: Option<String>,
    pub me: String,
    pub you: String,
}

/// POST /save-message
///
/// Persist first; only then try the live connection, falling back to a
/// push notification when the recipient is offline or the write fails.
/// Persistence failure aborts the whole operation.
pub async fn save_message(
    State(state): State<AppState>,
    payload: Result<Json<SaveMessageInput>, JsonRejection>,
) -> Result<Json<StoredMessage>, (StatusCode, Json<ErrorResponse>)> {
    let Json(input) = payload.map_err(|_| bad_request("Bad request"))?;
    if input.from.is_empty() || input.to.is_empty() {
        return Err(bad_request("Bad request"));
    }

    let stored = state
        .messages
        .save(&input.from, &input.to, &input.message, input.title)
        .await
        .map_err(|err| {
            warn!(error = %err, "message store rejected save");
            bad_request("Unable to save")
        })?;

    // The message is durable; relay is best-effort from here on.
    match state.router.deliver(&stored.to, &stored).await {
        DeliveryOutcome::Delivered => {
            info!(from = %stored.from, to = %stored.to, "stored message relayed");
        }
        DeliveryOutcome::RecipientOffline | DeliveryOutcome::DeliveryFailed => {
            state
                .notifier
                .notify(
                    &stored.to,
                    &stored.from,
                    stored.title.as_deref().unwrap_or_default(),
                    &stored.message,
                )
                .await;
        }
    }

    Ok(Json(stored))
}

/// POST /get-messages
///
/// One page of the conversation between `me` and `you`, newest first,
/// cursor-paginated around `index`.
pub async fn get_messages(
    State(state): State<AppState>,
    payload: Result<Json<GetMessagesInput>, JsonRejection>,
) -> Result<Json<Vec<StoredMessage>>, (StatusCode, Json<ErrorResponse>)> {
    let Json(input) = payload.map_err(|_| bad_request("Bad request"))?;

    let page = state
        .messages
        .conversation_page(
            &input.me,
            &input.you,
            input.index.as_deref(),
            input.retrieve_before_index,
        )
        .await
        .map_err(|err| {
            warn!(error = %err, "conversation query failed");
            bad_request("Unable to get")
        })?;

    Ok(Json(page))
}
