//! Relay server configuration

use std::path::PathBuf;
use std::sync::Arc;

use crate::friends::FriendManager;
use crate::notify::Notifier;
use crate::relay::{ConnectionRegistry, MessageRouter};
use crate::store::MessageStore;
use crate::users::UserDirectory;

/// Push API endpoint used when only a server key is configured.
const DEFAULT_PUSH_API_URL: &str = "https://fcm.googleapis.com/fcm/send";

/// Configuration for the relay server
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Listen port
    pub port: u16,
    /// Origins accepted for WebSocket upgrades
    pub allowed_origins: Vec<String>,
    /// Development flag: accept any origin
    pub local_dev: bool,
    /// Directory holding the SQLite database
    pub data_dir: PathBuf,
    /// Push collaborator credentials; push is disabled when unset
    pub push: Option<PushCredentials>,
}

#[derive(Clone, Debug)]
pub struct PushCredentials {
    pub api_url: String,
    pub server_key: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            allowed_origins: vec!["https://simple-chat-ui.vercel.app".to_string()],
            local_dev: false,
            data_dir: PathBuf::from("chat_data"),
            push: None,
        }
    }
}

impl RelayConfig {
    /// Build the configuration from the environment, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            let origins: Vec<String> = origins
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
            if !origins.is_empty() {
                config.allowed_origins = origins;
            }
        }
        config.local_dev = std::env::var("LOCAL").map(|v| v == "true").unwrap_or(false);
        if let Ok(dir) = std::env::var("CHAT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(server_key) = std::env::var("PUSH_SERVER_KEY") {
            config.push = Some(PushCredentials {
                api_url: std::env::var("PUSH_API_URL")
                    .unwrap_or_else(|_| DEFAULT_PUSH_API_URL.to_string()),
                server_key,
            });
        }

        config
    }

    /// Ensure the data directory exists
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub router: MessageRouter,
    pub messages: Arc<MessageStore>,
    pub users: Arc<UserDirectory>,
    pub friends: Arc<FriendManager>,
    pub notifier: Arc<dyn Notifier>,
}
