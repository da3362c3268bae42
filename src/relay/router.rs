//! Point-to-point routing of messages to live connections.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

use super::registry::ConnectionRegistry;
use crate::models::WireMessage;

/// Socket-originated frames that may wait for the routing consumer before
/// new ones are rejected.
pub const INTAKE_CAPACITY: usize = 256;

/// Result of one routing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    RecipientOffline,
    DeliveryFailed,
}

/// Routes messages to the recipient's registered connection.
///
/// Socket-originated frames go through [`submit`](Self::submit) into a
/// bounded intake queue drained by a single consumer task, so racing
/// senders cannot interleave their routing decisions. The request path
/// calls [`deliver`](Self::deliver) directly; in both cases the
/// per-connection writer keeps the actual frame writes serialized.
#[derive(Clone)]
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    intake: mpsc::Sender<WireMessage>,
}

impl MessageRouter {
    /// Start the routing consumer and return the shared handle.
    pub fn spawn(registry: Arc<ConnectionRegistry>) -> Self {
        let (intake, mut inbox) = mpsc::channel::<WireMessage>(INTAKE_CAPACITY);
        let consumer_registry = registry.clone();
        tokio::spawn(async move {
            while let Some(msg) = inbox.recv().await {
                let outcome = deliver_via(&consumer_registry, &msg.to, &msg).await;
                debug!(from = %msg.id, to = %msg.to, ?outcome, "frame routed");
            }
        });
        Self { registry, intake }
    }

    /// Fire-and-forget relay of a socket frame; outcomes are not surfaced
    /// to the sender. A full intake queue rejects the frame rather than
    /// grow without bound.
    pub fn submit(&self, msg: WireMessage) {
        match self.intake.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!(to = %dropped.to, "routing queue full, frame dropped");
            }
            Err(TrySendError::Closed(_)) => error!("routing consumer is gone"),
        }
    }

    /// Route one frame and wait for the outcome.
    pub async fn route(&self, msg: &WireMessage) -> DeliveryOutcome {
        deliver_via(&self.registry, &msg.to, msg).await
    }

    /// Deliver an arbitrary payload to `to`'s live connection, if any. The
    /// request path uses this for stored messages and friend events.
    pub async fn deliver<T: Serialize>(&self, to: &str, payload: &T) -> DeliveryOutcome {
        deliver_via(&self.registry, to, payload).await
    }
}

/// Lookup, one bounded-time write, evict on failure. A broken transport is
/// assumed permanently broken: no retry, no reconnect.
async fn deliver_via<T: Serialize>(
    registry: &ConnectionRegistry,
    to: &str,
    payload: &T,
) -> DeliveryOutcome {
    let Some(conn) = registry.lookup(to) else {
        return DeliveryOutcome::RecipientOffline;
    };
    match conn.send_json(payload).await {
        Ok(()) => DeliveryOutcome::Delivered,
        Err(err) => {
            warn!(user = %to, error = %err, "write failed, evicting connection");
            registry.unregister(to, conn.id());
            conn.close();
            DeliveryOutcome::DeliveryFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::connection::Connection;
    use axum::extract::ws::Message as WsMessage;
    use tokio::sync::mpsc;

    fn frame(to: &str) -> WireMessage {
        WireMessage {
            timestamp: 1_700_000_000,
            message: "hi".to_string(),
            id: "a".to_string(),
            to: to.to_string(),
        }
    }

    #[tokio::test]
    async fn offline_recipient_does_not_touch_the_registry() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = MessageRouter::spawn(registry.clone());

        let outcome = router.route(&frame("b")).await;

        assert_eq!(outcome, DeliveryOutcome::RecipientOffline);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn delivery_reaches_the_registered_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = MessageRouter::spawn(registry.clone());
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(Connection::new("b", tx));

        let outcome = router.route(&frame("b")).await;
        assert_eq!(outcome, DeliveryOutcome::Delivered);

        let WsMessage::Text(text) = rx.recv().await.unwrap() else {
            panic!("expected a text frame");
        };
        let relayed: WireMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(relayed.to, "b");
        assert_eq!(relayed.message, "hi");
    }

    #[tokio::test]
    async fn write_failure_evicts_the_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = MessageRouter::spawn(registry.clone());
        let (tx, rx) = mpsc::channel(4);
        registry.register(Connection::new("b", tx));
        drop(rx);

        assert_eq!(router.route(&frame("b")).await, DeliveryOutcome::DeliveryFailed);
        assert!(registry.lookup("b").is_none());

        // The registry self-healed; the next attempt is a plain miss.
        assert_eq!(router.route(&frame("b")).await, DeliveryOutcome::RecipientOffline);
    }

    #[tokio::test(start_paused = true)]
    async fn full_frame_queue_counts_as_a_write_failure() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = MessageRouter::spawn(registry.clone());

        // Capacity-one queue with no writer draining it.
        let (tx, _rx) = mpsc::channel(1);
        registry.register(Connection::new("b", tx.clone()));
        tx.send(WsMessage::Ping(vec![].into())).await.unwrap();

        assert_eq!(router.route(&frame("b")).await, DeliveryOutcome::DeliveryFailed);
        assert!(registry.lookup("b").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_recipient_does_not_block_others() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = MessageRouter::spawn(registry.clone());

        let (stuck_tx, _stuck_rx) = mpsc::channel(1);
        registry.register(Connection::new("stuck", stuck_tx.clone()));
        stuck_tx.send(WsMessage::Ping(vec![].into())).await.unwrap();

        let (live_tx, mut live_rx) = mpsc::channel(4);
        registry.register(Connection::new("live", live_tx));

        let stuck = tokio::spawn({
            let router = router.clone();
            async move { router.route(&frame("stuck")).await }
        });

        // The live recipient is served while the stuck write waits out its
        // timeout.
        assert_eq!(router.route(&frame("live")).await, DeliveryOutcome::Delivered);
        assert!(live_rx.recv().await.is_some());

        assert_eq!(stuck.await.unwrap(), DeliveryOutcome::DeliveryFailed);
    }
}
