//! User directory endpoints: sign-in, lookups, contacts, push tokens.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{bad_request, ErrorResponse, SuccessResponse};
use crate::config::AppState;
use crate::models::UserSummary;

#[derive(Debug, Deserialize)]
pub struct SignInInput {
    pub email: String,
    #[serde(rename = "authId")]
    pub auth_id: String,
}

/// POST /sign-in
pub async fn sign_in(
    State(state): State<AppState>,
    payload: Result<Json<SignInInput>, JsonRejection>,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Json(input) = payload.map_err(|_| bad_request("Bad request"))?;

    state
        .users
        .sign_in(input.email, input.auth_id)
        .await
        .map_err(|err| bad_request(err.to_string()))?;

    Ok(SuccessResponse::ok())
}

#[derive(Debug, Deserialize)]
pub struct GetUserIdInput {
    #[serde(rename = "authId")]
    pub auth_id: String,
}

#[derive(Debug, Serialize)]
pub struct UserIdResponse {
    #[serde(rename = "_id")]
    pub id: String,
}

/// POST /get-user-id
pub async fn get_user_id(
    State(state): State<AppState>,
    payload: Result<Json<GetUserIdInput>, JsonRejection>,
) -> Result<Json<UserIdResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Json(input) = payload.map_err(|_| bad_request("Bad request"))?;

    let id = state
        .users
        .find_by_auth_id(&input.auth_id)
        .await
        .map_err(|err| bad_request(err.to_string()))?
        .ok_or_else(|| bad_request("User not found"))?;

    Ok(Json(UserIdResponse { id }))
}

#[derive(Debug, Deserialize)]
pub struct QueryContactsInput {
    #[serde(rename = "searchTerm")]
    pub search_term: String,
}

/// POST /query-contacts
pub async fn query_contacts(
    State(state): State<AppState>,
    payload: Result<Json<QueryContactsInput>, JsonRejection>,
) -> Result<Json<Vec<UserSummary>>, (StatusCode, Json<ErrorResponse>)> {
    let Json(input) = payload.map_err(|_| bad_request("Bad request"))?;

    let users = state
        .users
        .search(&input.search_term)
        .await
        .map_err(|err| bad_request(err.to_string()))?;

    Ok(Json(users))
}

#[derive(Debug, Deserialize)]
pub struct GetUserContactsInput {
    #[serde(rename = "_id")]
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ContactsResponse {
    pub contacts: Vec<UserSummary>,
    pub requests: Vec<UserSummary>,
}

/// POST /get-user-contacts
///
/// A user's established contacts plus the users whose friend requests are
/// awaiting their answer.
pub async fn get_user_contacts(
    State(state): State<AppState>,
    payload: Result<Json<GetUserContactsInput>, JsonRejection>,
) -> Result<Json<ContactsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Json(input) = payload.map_err(|_| bad_request("Bad request"))?;

    let contact_ids = state
        .friends
        .contact_ids(&input.id)
        .await
        .map_err(|err| bad_request(err.to_string()))?;
    let request_ids = state
        .friends
        .received_request_ids(&input.id)
        .await
        .map_err(|err| bad_request(err.to_string()))?;

    let contacts = state
        .users
        .summaries(&contact_ids)
        .await
        .map_err(|err| bad_request(err.to_string()))?;
    let requests = state
        .users
        .summaries(&request_ids)
        .await
        .map_err(|err| bad_request(err.to_string()))?;

    Ok(Json(ContactsResponse { contacts, requests }))
}

#[derive(Debug, Deserialize)]
pub struct AddContactInput {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "contactId")]
    pub contact_id: String,
}

/// POST /add-user-contacts
pub async fn add_user_contact(
    State(state): State<AppState>,
    payload: Result<Json<AddContactInput>, JsonRejection>,
) -> Result<Json<Vec<String>>, (StatusCode, Json<ErrorResponse>)> {
    let Json(input) = payload.map_err(|_| bad_request("Bad request"))?;

    let contacts = state
        .friends
        .add_contact(&input.id, &input.contact_id)
        .await
        .map_err(|err| bad_request(err.to_string()))?;

    Ok(Json(contacts))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserInput {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
}

/// POST /update-user
pub async fn update_user(
    State(state): State<AppState>,
    payload: Result<Json<UpdateUserInput>, JsonRejection>,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Json(input) = payload.map_err(|_| bad_request("Bad request"))?;

    state
        .users
        .update_email(&input.id, &input.email)
        .await
        .map_err(|err| bad_request(err.to_string()))?;

    Ok(SuccessResponse::ok())
}

#[derive(Debug, Deserialize)]
pub struct UpdateTokenInput {
    #[serde(rename = "_id")]
    pub id: String,
    pub token: String,
}

/// POST /update-user-token
pub async fn update_user_token(
    State(state): State<AppState>,
    payload: Result<Json<UpdateTokenInput>, JsonRejection>,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Json(input) = payload.map_err(|_| bad_request("Bad request"))?;

    state
        .users
        .update_push_token(&input.id, &input.token)
        .await
        .map_err(|err| {
            warn!(error = %err, "push token update failed");
            bad_request(err.to_string())
        })?;

    Ok(SuccessResponse::ok())
}
