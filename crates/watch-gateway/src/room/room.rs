//! Local room membership

use crate::connection::Connection;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use watch_core::RoomId;

/// Connections of one room hosted on this node
pub struct Room {
    id: RoomId,
    members: RwLock<HashMap<Uuid, Arc<Connection>>>,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            members: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    /// Add a connection, returns false if it was already present
    pub fn add(&self, conn: &Arc<Connection>) -> bool {
        self.members.write().insert(conn.id(), conn.clone()).is_none()
    }

    /// Remove a connection, returns false if it was not present
    pub fn remove(&self, conn: &Connection) -> bool {
        self.members.write().remove(&conn.id()).is_some()
    }

    pub fn contains(&self, conn: &Connection) -> bool {
        self.members.read().contains_key(&conn.id())
    }

    pub fn members(&self) -> Vec<Arc<Connection>> {
        self.members.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("members", &self.len())
            .finish()
    }
}
