//! Request-path message flow: persist first, then relay to a live
//! connection or fall back to the push collaborator.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::Message as WsMessage;
use axum::extract::State;
use axum::Json;
use chat_relay::config::{AppState, RelayConfig};
use chat_relay::friends::FriendManager;
use chat_relay::handlers::messages::{save_message, SaveMessageInput};
use chat_relay::models::StoredMessage;
use chat_relay::notify::Notifier;
use chat_relay::relay::{Connection, ConnectionRegistry, MessageRouter};
use chat_relay::store::MessageStore;
use chat_relay::users::UserDirectory;
use parking_lot::Mutex;
use tempfile::tempdir;
use tokio::sync::mpsc;

/// Records every notification instead of pushing anywhere.
#[derive(Default)]
struct RecordingNotifier {
    calls: Mutex<Vec<(String, String, String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, to: &str, from: &str, title: &str, body: &str) {
        self.calls.lock().push((
            to.to_string(),
            from.to_string(),
            title.to_string(),
            body.to_string(),
        ));
    }
}

async fn test_state(dir: &Path, notifier: Arc<dyn Notifier>) -> AppState {
    let registry = Arc::new(ConnectionRegistry::new());
    AppState {
        config: RelayConfig {
            data_dir: dir.to_path_buf(),
            ..RelayConfig::default()
        },
        router: MessageRouter::spawn(registry.clone()),
        registry,
        messages: Arc::new(MessageStore::new(dir).await.unwrap()),
        users: Arc::new(UserDirectory::new(dir).await.unwrap()),
        friends: Arc::new(FriendManager::new(dir).await.unwrap()),
        notifier,
    }
}

fn input(from: &str, to: &str, title: Option<&str>, body: &str) -> SaveMessageInput {
    SaveMessageInput {
        message: body.to_string(),
        title: title.map(|t| t.to_string()),
        from: from.to_string(),
        to: to.to_string(),
    }
}

#[tokio::test]
async fn offline_recipient_gets_stored_record_and_notification() {
    let dir = tempdir().unwrap();
    let recorder = Arc::new(RecordingNotifier::default());
    let state = test_state(dir.path(), recorder.clone()).await;

    let Json(stored) = save_message(
        State(state),
        Ok(Json(input("A", "B", Some("chat"), "hi"))),
    )
    .await
    .expect("save should succeed");

    assert!(!stored.id.is_empty());
    assert_eq!(stored.from, "A");
    assert_eq!(stored.to, "B");
    assert_eq!(stored.expire_at - stored.created_at, chrono::Duration::days(7));

    let calls = recorder.calls.lock().clone();
    assert_eq!(
        calls,
        vec![(
            "B".to_string(),
            "A".to_string(),
            "chat".to_string(),
            "hi".to_string()
        )]
    );
}

#[tokio::test]
async fn live_recipient_gets_the_relay_instead_of_a_notification() {
    let dir = tempdir().unwrap();
    let recorder = Arc::new(RecordingNotifier::default());
    let state = test_state(dir.path(), recorder.clone()).await;

    let (tx, mut rx) = mpsc::channel(8);
    state.registry.register(Connection::new("B", tx));

    let Json(stored) = save_message(
        State(state),
        Ok(Json(input("A", "B", Some("chat"), "hi"))),
    )
    .await
    .expect("save should succeed");

    let WsMessage::Text(text) = rx.recv().await.unwrap() else {
        panic!("expected a text frame");
    };
    let relayed: StoredMessage = serde_json::from_str(&text).unwrap();
    assert_eq!(relayed.id, stored.id);
    assert_eq!(relayed.message, "hi");

    // Delivered live, so the push collaborator stays silent.
    assert!(recorder.calls.lock().is_empty());
}

#[tokio::test]
async fn conversation_pages_are_newest_first_and_cursor_bounded() {
    let dir = tempdir().unwrap();
    let store = MessageStore::new(dir.path()).await.unwrap();

    let mut ids = Vec::new();
    for i in 0..7 {
        let (from, to) = if i % 2 == 0 { ("A", "B") } else { ("B", "A") };
        let stored = store.save(from, to, &format!("m{i}"), None).await.unwrap();
        ids.push(stored.id);
    }
    // Unrelated conversation must never leak in.
    store.save("C", "D", "other", None).await.unwrap();

    // First page: the five newest, newest first.
    let page = store.conversation_page("A", "B", None, false).await.unwrap();
    let bodies: Vec<_> = page.iter().map(|m| m.message.clone()).collect();
    assert_eq!(bodies, vec!["m6", "m5", "m4", "m3", "m2"]);

    // Continue into older messages from the oldest id on the page.
    let cursor = &page.last().unwrap().id;
    let older = store
        .conversation_page("A", "B", Some(cursor), true)
        .await
        .unwrap();
    let bodies: Vec<_> = older.iter().map(|m| m.message.clone()).collect();
    assert_eq!(bodies, vec!["m1", "m0"]);

    // And back towards newer ones from the very first message.
    let newer = store
        .conversation_page("A", "B", Some(&ids[0]), false)
        .await
        .unwrap();
    let bodies: Vec<_> = newer.iter().map(|m| m.message.clone()).collect();
    assert_eq!(bodies, vec!["m6", "m5", "m4", "m3", "m2"]);
}

#[tokio::test]
async fn fresh_messages_survive_the_expiry_sweep() {
    let dir = tempdir().unwrap();
    let store = MessageStore::new(dir.path()).await.unwrap();

    store.save("A", "B", "hi", None).await.unwrap();
    assert_eq!(store.purge_expired().await.unwrap(), 0);

    let page = store.conversation_page("A", "B", None, false).await.unwrap();
    assert_eq!(page.len(), 1);
}
