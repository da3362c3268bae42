//! Component-level relay scenarios: registry, router, and connection
//! working together the way the WebSocket handler drives them.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message as WsMessage;
use chat_relay::models::WireMessage;
use chat_relay::relay::connection::FRAME_QUEUE_CAPACITY;
use chat_relay::relay::{Connection, ConnectionRegistry, DeliveryOutcome, MessageRouter};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn frame(from: &str, to: &str, body: &str) -> WireMessage {
    WireMessage {
        timestamp: 1_700_000_000,
        message: body.to_string(),
        id: from.to_string(),
        to: to.to_string(),
    }
}

/// Register a user the way the WebSocket handler does and keep the
/// transport end so the test can observe delivered frames.
fn connect(registry: &ConnectionRegistry, user: &str) -> (Connection, mpsc::Receiver<WsMessage>) {
    let (tx, rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
    let conn = Connection::new(user, tx);
    registry.register(conn.clone());
    (conn, rx)
}

async fn next_text(rx: &mut mpsc::Receiver<WsMessage>) -> String {
    loop {
        let frame = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("transport closed");
        if let WsMessage::Text(text) = frame {
            return text.to_string();
        }
    }
}

#[tokio::test]
async fn frame_from_a_reaches_b_verbatim() {
    let registry = Arc::new(ConnectionRegistry::new());
    let router = MessageRouter::spawn(registry.clone());

    let (_a, _a_rx) = connect(&registry, "A");
    let (_b, mut b_rx) = connect(&registry, "B");

    router.submit(frame("A", "B", "hi"));

    let relayed: WireMessage = serde_json::from_str(&next_text(&mut b_rx).await).unwrap();
    assert_eq!(relayed.id, "A");
    assert_eq!(relayed.to, "B");
    assert_eq!(relayed.message, "hi");
}

#[tokio::test]
async fn reconnect_evicts_the_stale_session() {
    let registry = Arc::new(ConnectionRegistry::new());
    let router = MessageRouter::spawn(registry.clone());

    let (stale, mut stale_rx) = connect(&registry, "B");
    let (_fresh, mut fresh_rx) = connect(&registry, "B");

    // The replaced session was told to close, exactly once.
    assert!(stale.is_closed());
    assert!(matches!(stale_rx.recv().await, Some(WsMessage::Close(_))));

    // Frames now reach the fresh session only.
    assert_eq!(router.route(&frame("A", "B", "again")).await, DeliveryOutcome::Delivered);
    let relayed: WireMessage = serde_json::from_str(&next_text(&mut fresh_rx).await).unwrap();
    assert_eq!(relayed.message, "again");
    assert!(stale_rx.try_recv().is_err());
}

#[tokio::test]
async fn unclean_disconnect_self_heals_on_next_route() {
    let registry = Arc::new(ConnectionRegistry::new());
    let router = MessageRouter::spawn(registry.clone());

    let (_b, b_rx) = connect(&registry, "B");
    // Transport drops without any unregister.
    drop(b_rx);

    // The first routing attempt fails and evicts; the recipient is then
    // simply offline rather than a hang.
    assert_eq!(router.route(&frame("A", "B", "hi")).await, DeliveryOutcome::DeliveryFailed);
    assert!(registry.lookup("B").is_none());
    assert_eq!(
        router.route(&frame("A", "B", "hi")).await,
        DeliveryOutcome::RecipientOffline
    );
}

#[tokio::test]
async fn offline_routing_leaves_other_sessions_untouched() {
    let registry = Arc::new(ConnectionRegistry::new());
    let router = MessageRouter::spawn(registry.clone());

    let (_a, _a_rx) = connect(&registry, "A");

    assert_eq!(
        router.route(&frame("A", "nobody", "hi")).await,
        DeliveryOutcome::RecipientOffline
    );
    assert_eq!(registry.len(), 1);
    assert!(registry.lookup("A").is_some());
}

#[tokio::test]
async fn concurrent_sends_to_one_recipient_arrive_as_whole_frames() {
    let registry = Arc::new(ConnectionRegistry::new());
    let router = MessageRouter::spawn(registry.clone());

    let (_b, mut b_rx) = connect(&registry, "B");

    let mut tasks = Vec::new();
    for i in 0..20 {
        let router = router.clone();
        tasks.push(tokio::spawn(async move {
            router.route(&frame("A", "B", &format!("msg-{i}"))).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), DeliveryOutcome::Delivered);
    }

    // Every frame decodes on its own: no partial or merged writes.
    let mut seen = Vec::new();
    for _ in 0..20 {
        let relayed: WireMessage = serde_json::from_str(&next_text(&mut b_rx).await).unwrap();
        seen.push(relayed.message);
    }
    seen.sort();
    let mut expected: Vec<String> = (0..20).map(|i| format!("msg-{i}")).collect();
    expected.sort();
    assert_eq!(seen, expected);
}
