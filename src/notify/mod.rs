//! Push Notification Gateway
//!
//! Best-effort side channel used when a recipient has no live connection.
//! Failures here are logged and swallowed; they never fail the request
//! that triggered them.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::PushCredentials;
use crate::users::UserDirectory;

/// The notification collaborator seam. The relay core never calls this;
/// the request path does, after persistence, when relay was not possible.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Push a message alert to `to`'s device. Best-effort.
    async fn notify(&self, to: &str, from: &str, title: &str, body: &str);
}

/// HTTP push gateway. Resolves the recipient's device token from the user
/// directory and posts a notification payload to the configured API.
pub struct PushGateway {
    users: Arc<UserDirectory>,
    client: reqwest::Client,
    credentials: Option<PushCredentials>,
}

impl PushGateway {
    pub fn new(users: Arc<UserDirectory>, credentials: Option<PushCredentials>) -> Self {
        Self {
            users,
            client: reqwest::Client::new(),
            credentials,
        }
    }
}

#[async_trait]
impl Notifier for PushGateway {
    async fn notify(&self, to: &str, from: &str, title: &str, body: &str) {
        let Some(ref credentials) = self.credentials else {
            debug!("Push gateway not configured, notification skipped");
            return;
        };

        let token = match self.users.push_token(to).await {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => {
                warn!(user = %to, "Failed notification, no device token");
                return;
            }
            Err(err) => {
                warn!(user = %to, error = %err, "Failed notification, token lookup error");
                return;
            }
        };

        let payload = serde_json::json!({
            "to": token,
            "notification": {
                "title": format!("{title}:"),
                "body": body,
            },
            "data": {
                "tag": from,
            },
        });

        let result = self
            .client
            .post(&credentials.api_url)
            .header("Authorization", format!("key={}", credentials.server_key))
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(user = %to, "Notification sent");
            }
            Ok(response) => {
                warn!(user = %to, status = %response.status(), "Push gateway rejected notification");
            }
            Err(err) => {
                warn!(user = %to, error = %err, "Push gateway unreachable");
            }
        }
    }
}
