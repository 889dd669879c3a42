//! Client registry
//!
//! Process-local index from session id to the connection currently holding it.

use super::{Connection, Session};
use dashmap::DashMap;
use std::sync::Arc;

/// Session id -> live connection on this node
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<String, Arc<Connection>>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its current session id
    ///
    /// Returns the connection previously registered under that id, if it was a
    /// different one.
    pub fn add(&self, conn: &Arc<Connection>) -> Option<Arc<Connection>> {
        let session_id = conn.session_id();
        let previous = self.clients.insert(session_id.clone(), conn.clone());

        tracing::debug!(session_id = %session_id, connection_id = %conn.id(), "Client added");

        previous.filter(|p| p.id() != conn.id())
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Connection>> {
        self.clients.get(session_id).map(|r| r.clone())
    }

    /// Remove a connection
    ///
    /// Only removes the entry if it still points at `conn`, so a superseded socket
    /// closing late never evicts the connection that replaced it.
    pub fn remove(&self, conn: &Connection) -> bool {
        let session_id = conn.session_id();
        let removed = self
            .clients
            .remove_if(&session_id, |_, current| current.id() == conn.id())
            .is_some();

        if removed {
            tracing::debug!(session_id = %session_id, connection_id = %conn.id(), "Client removed");
        }

        removed
    }

    /// Swap the connection's session and move its registry entry
    ///
    /// Returns the connection that held the new session id before, if any.
    pub fn update_session(&self, conn: &Arc<Connection>, session: Arc<Session>) -> Option<Arc<Connection>> {
        let old = conn.replace_session(session);
        self.clients.remove_if(old.id(), |_, current| current.id() == conn.id());
        self.add(conn)
    }

    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.clients.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
