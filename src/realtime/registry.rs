//! Session Registry & Topic Router
//! Mission: Atomically track live connections, their identities, and their
//! per-symbol topic membership
//!
//! One mutex guards all three maps so compound mutations (authenticate and
//! index, disconnect and deindex) can never interleave into a state where
//! the identity index or a topic references a dead connection.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

/// One live transport connection. Unauthenticated until the client presents
/// a valid token; it may re-authenticate under a different identity.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    pub connection_id: Uuid,
    pub user_id: Option<String>,
    pub subscribed: HashSet<String>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<Uuid, ConnectionSession>,
    /// user id -> live connection ids. Entries are removed eagerly when the
    /// last connection goes away; no empty sets linger.
    by_user: HashMap<String, HashSet<Uuid>>,
    /// symbol -> subscribed connection ids. Topics are created on first
    /// subscribe and never destroyed; the symbol set is fixed and small.
    topics: HashMap<String, HashSet<Uuid>>,
}

/// Registry of live connections, shared between the websocket tasks and the
/// REST subscription endpoints.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh, unauthenticated session.
    pub fn on_connect(&self) -> Uuid {
        let connection_id = Uuid::new_v4();
        let mut inner = self.inner.lock();
        inner.sessions.insert(
            connection_id,
            ConnectionSession {
                connection_id,
                user_id: None,
                subscribed: HashSet::new(),
            },
        );
        debug!("🔌 Connection registered: {}", connection_id);
        connection_id
    }

    /// Bind a verified identity to a connection and index it.
    ///
    /// Re-authenticating under a new identity moves the connection: it is
    /// removed from the previous identity's set first, so a connection is
    /// tracked under exactly one user at a time.
    pub fn authenticate(&self, connection_id: Uuid, user_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(session) = inner.sessions.get_mut(&connection_id) else {
            return false;
        };

        let previous = session.user_id.replace(user_id.to_string());
        if let Some(prev_user) = previous {
            if prev_user != user_id {
                Self::detach_from_user(&mut inner.by_user, &prev_user, connection_id);
            }
        }

        inner
            .by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(connection_id);

        let active = inner.by_user[user_id].len();
        debug!(
            "🔑 Connection {} authenticated as {} ({} active for this user)",
            connection_id, user_id, active
        );
        true
    }

    /// Join a symbol topic. No-op when the session is missing, not yet
    /// authenticated (permissive join semantics), or already subscribed.
    pub fn subscribe(&self, connection_id: Uuid, symbol: &str) {
        let mut inner = self.inner.lock();
        let Some(session) = inner.sessions.get_mut(&connection_id) else {
            return;
        };
        if session.user_id.is_none() {
            debug!(
                "Ignoring subscribe from unauthenticated connection {}",
                connection_id
            );
            return;
        }
        if !session.subscribed.insert(symbol.to_string()) {
            return;
        }
        inner
            .topics
            .entry(symbol.to_string())
            .or_default()
            .insert(connection_id);
        debug!("📈 Connection {} subscribed to {}", connection_id, symbol);
    }

    /// Leave a symbol topic. Idempotent.
    pub fn unsubscribe(&self, connection_id: Uuid, symbol: &str) {
        let mut inner = self.inner.lock();
        let Some(session) = inner.sessions.get_mut(&connection_id) else {
            return;
        };
        if !session.subscribed.remove(symbol) {
            return;
        }
        if let Some(members) = inner.topics.get_mut(symbol) {
            members.remove(&connection_id);
        }
    }

    /// Remove a session and every reference to it. Idempotent; disconnecting
    /// an unknown connection is a no-op.
    pub fn on_disconnect(&self, connection_id: Uuid) {
        let mut inner = self.inner.lock();
        let Some(session) = inner.sessions.remove(&connection_id) else {
            return;
        };

        if let Some(user_id) = &session.user_id {
            Self::detach_from_user(&mut inner.by_user, user_id, connection_id);
        }
        for symbol in &session.subscribed {
            if let Some(members) = inner.topics.get_mut(symbol) {
                members.remove(&connection_id);
            }
        }
        debug!("🔌 Connection removed: {}", connection_id);
    }

    fn detach_from_user(
        by_user: &mut HashMap<String, HashSet<Uuid>>,
        user_id: &str,
        connection_id: Uuid,
    ) {
        if let Some(set) = by_user.get_mut(user_id) {
            set.remove(&connection_id);
            if set.is_empty() {
                by_user.remove(user_id);
            }
        }
    }

    /// Live connection ids for a user. Empty when the user has none.
    pub fn connections_for_user(&self, user_id: &str) -> Vec<Uuid> {
        self.inner
            .lock()
            .by_user
            .get(user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Connections currently joined to a symbol topic. Maintained for join
    /// bookkeeping and introspection; the tick broadcast intentionally sends
    /// the full snapshot to every connection instead of filtering by topic.
    pub fn topic_members(&self, symbol: &str) -> Vec<Uuid> {
        self.inner
            .lock()
            .topics
            .get(symbol)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn session(&self, connection_id: Uuid) -> Option<ConnectionSession> {
        self.inner.lock().sessions.get(&connection_id).cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_starts_unauthenticated() {
        let registry = SessionRegistry::new();
        let conn = registry.on_connect();
        let session = registry.session(conn).unwrap();
        assert!(session.user_id.is_none());
        assert!(session.subscribed.is_empty());
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn test_two_connections_one_user_lifecycle() {
        let registry = SessionRegistry::new();
        let a = registry.on_connect();
        let b = registry.on_connect();
        assert!(registry.authenticate(a, "u1"));
        assert!(registry.authenticate(b, "u1"));
        assert_eq!(registry.connections_for_user("u1").len(), 2);

        registry.on_disconnect(a);
        assert_eq!(registry.connections_for_user("u1"), vec![b]);

        registry.on_disconnect(b);
        // Last connection gone: the user disappears from the index.
        assert!(registry.connections_for_user("u1").is_empty());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let registry = SessionRegistry::new();
        let conn = registry.on_connect();
        registry.authenticate(conn, "u1");
        registry.subscribe(conn, "GOOG");

        registry.on_disconnect(conn);
        registry.on_disconnect(conn);
        assert_eq!(registry.connection_count(), 0);
        assert!(registry.topic_members("GOOG").is_empty());
    }

    #[test]
    fn test_reauth_moves_connection_between_users() {
        let registry = SessionRegistry::new();
        let conn = registry.on_connect();
        registry.authenticate(conn, "u1");
        registry.authenticate(conn, "u2");

        assert!(registry.connections_for_user("u1").is_empty());
        assert_eq!(registry.connections_for_user("u2"), vec![conn]);
        assert_eq!(registry.session(conn).unwrap().user_id.as_deref(), Some("u2"));
    }

    #[test]
    fn test_subscribe_requires_authentication() {
        let registry = SessionRegistry::new();
        let conn = registry.on_connect();

        // Silently ignored before authentication.
        registry.subscribe(conn, "GOOG");
        assert!(registry.topic_members("GOOG").is_empty());

        registry.authenticate(conn, "u1");
        registry.subscribe(conn, "GOOG");
        assert_eq!(registry.topic_members("GOOG"), vec![conn]);
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let registry = SessionRegistry::new();
        let conn = registry.on_connect();
        registry.authenticate(conn, "u1");
        registry.subscribe(conn, "TSLA");
        registry.subscribe(conn, "TSLA");
        assert_eq!(registry.topic_members("TSLA").len(), 1);
        assert_eq!(registry.session(conn).unwrap().subscribed.len(), 1);
    }

    #[test]
    fn test_unsubscribe_removes_topic_membership() {
        let registry = SessionRegistry::new();
        let conn = registry.on_connect();
        registry.authenticate(conn, "u1");
        registry.subscribe(conn, "TSLA");
        registry.unsubscribe(conn, "TSLA");
        assert!(registry.topic_members("TSLA").is_empty());

        // Unsubscribing again is a no-op.
        registry.unsubscribe(conn, "TSLA");
    }

    #[test]
    fn test_disconnect_clears_every_topic() {
        let registry = SessionRegistry::new();
        let conn = registry.on_connect();
        registry.authenticate(conn, "u1");
        for symbol in ["GOOG", "TSLA", "NVDA"] {
            registry.subscribe(conn, symbol);
        }

        registry.on_disconnect(conn);
        for symbol in ["GOOG", "TSLA", "NVDA"] {
            assert!(registry.topic_members(symbol).is_empty());
        }
    }
}
