//! Chat Relay Server
//!
//! Point-to-point message relay for a two-party chat application: live
//! WebSocket connections keyed by user identity, a SQLite message log for
//! the request path, and best-effort push notification when the recipient
//! is offline.

pub mod config;
pub mod friends;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod relay;
pub mod store;
pub mod users;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::{AppState, RelayConfig};
use friends::FriendManager;
use handlers::{
    accept_friend_request, add_user_contact, get_messages, get_user_contacts, get_user_id,
    query_contacts, save_message, send_friend_request, sign_in, update_user, update_user_token,
    ws_upgrade,
};
use notify::{Notifier, PushGateway};
use relay::{ConnectionRegistry, MessageRouter};
use store::MessageStore;
use users::UserDirectory;

/// How often expired messages are swept from the log.
const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        // Already set, ignore
    }

    info!("=== Chat Relay ===");

    let config = RelayConfig::from_env();
    config.ensure_dirs().await?;
    info!("Data directory: {:?}", config.data_dir);

    let messages = Arc::new(MessageStore::new(&config.data_dir).await?);
    let users = Arc::new(UserDirectory::new(&config.data_dir).await?);
    let friends = Arc::new(FriendManager::new(&config.data_dir).await?);

    // Exactly one registry for the process lifetime; the router's consumer
    // serializes all socket-originated routing decisions.
    let registry = Arc::new(ConnectionRegistry::new());
    let router = MessageRouter::spawn(registry.clone());
    info!("Connection registry and router started");

    let notifier: Arc<dyn Notifier> = Arc::new(PushGateway::new(users.clone(), config.push.clone()));
    if config.push.is_some() {
        info!("Push gateway configured");
    } else {
        info!("Push gateway disabled (no PUSH_SERVER_KEY)");
    }

    // Background sweep of expired messages
    let sweep_store = messages.clone();
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(PURGE_INTERVAL);
        loop {
            timer.tick().await;
            match sweep_store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => info!("Purged {} expired messages", removed),
                Err(err) => warn!("Expired message sweep failed: {}", err),
            }
        }
    });

    let state = AppState {
        config: config.clone(),
        registry,
        router,
        messages,
        users,
        friends,
        notifier,
    };

    let app = Router::new()
        // Websocket connections
        .route("/ws", get(ws_upgrade))
        // Message based routes
        .route("/save-message", post(save_message))
        .route("/get-messages", post(get_messages))
        // User based routes
        .route("/sign-in", post(sign_in))
        .route("/get-user-id", post(get_user_id))
        .route("/query-contacts", post(query_contacts))
        .route("/get-user-contacts", post(get_user_contacts))
        .route("/add-user-contacts", post(add_user_contact))
        .route("/update-user", post(update_user))
        .route("/update-user-token", post(update_user_token))
        .route("/send-friend-request", post(send_friend_request))
        .route("/accept-friend-request", post(accept_friend_request))
        // Health check
        .route("/health", get(health_check))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("http server started on :{}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK - Chat Relay"
}
