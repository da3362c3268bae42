//! The authoritative map from user identity to its current connection.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::connection::Connection;

/// Sole owner and mutator of the `user id -> Connection` map.
///
/// One instance exists for the process lifetime, constructed at startup and
/// shared through the application state. Handlers and the REST surface only
/// call [`register`](Self::register), [`unregister`](Self::unregister) and
/// [`lookup`](Self::lookup); the map itself is never exposed. Lock hold
/// time is one map access, never I/O.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `conn` as the single live connection for its user, closing
    /// and returning whichever connection it replaced. A reconnect thereby
    /// evicts the stale session atomically. Never fails.
    pub fn register(&self, conn: Connection) -> Option<Connection> {
        let user_id = conn.user_id().to_string();
        let evicted = self.connections.lock().insert(user_id.clone(), conn);
        if let Some(ref old) = evicted {
            // Close outside the lock; close only queues a frame.
            old.close();
            debug!(user = %user_id, "replaced stale connection");
        }
        evicted
    }

    /// Remove the mapping only if `conn_id` still identifies the registered
    /// connection. A late unregister from a superseded handler must not
    /// evict the newer live connection, so anything else is a no-op.
    pub fn unregister(&self, user_id: &str, conn_id: Uuid) -> bool {
        let mut connections = self.connections.lock();
        match connections.get(user_id) {
            Some(current) if current.id() == conn_id => {
                connections.remove(user_id);
                debug!(user = %user_id, "connection unregistered");
                true
            }
            _ => false,
        }
    }

    /// Current connection for `user_id`, if any.
    pub fn lookup(&self, user_id: &str) -> Option<Connection> {
        self.connections.lock().get(user_id).cloned()
    }

    /// Number of live connections. Diagnostics only.
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message as WsMessage;
    use tokio::sync::mpsc;

    fn connection(user: &str) -> (Connection, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(4);
        (Connection::new(user, tx), rx)
    }

    #[tokio::test]
    async fn register_replaces_and_closes_previous() {
        let registry = ConnectionRegistry::new();
        let (first, mut first_rx) = connection("a");
        let (second, _second_rx) = connection("a");

        assert!(registry.register(first.clone()).is_none());
        let evicted = registry.register(second.clone()).expect("evicted");

        assert_eq!(evicted.id(), first.id());
        assert!(first.is_closed());
        assert!(matches!(first_rx.recv().await, Some(WsMessage::Close(_))));
        assert_eq!(registry.lookup("a").unwrap().id(), second.id());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn stale_unregister_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        let (stale, _rx1) = connection("a");
        let (fresh, _rx2) = connection("a");

        registry.register(stale.clone());
        registry.register(fresh.clone());

        assert!(!registry.unregister("a", stale.id()));
        assert_eq!(registry.lookup("a").unwrap().id(), fresh.id());

        assert!(registry.unregister("a", fresh.id()));
        assert!(registry.lookup("a").is_none());
    }

    #[tokio::test]
    async fn lookup_unknown_user_is_none() {
        let registry = ConnectionRegistry::new();
        assert!(registry.lookup("nobody").is_none());
        assert!(registry.is_empty());
    }
}
