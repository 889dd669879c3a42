//! Logical client session
//!
//! A session outlives any single socket. Its id, user and room are mirrored in the
//! store hash `session:{id}`; the role set is kept in memory only and reloaded on
//! every room join.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use watch_cache::keys::fields;
use watch_core::{Permissions, RoleId, RoleSet, RoomId, UserId};

/// Mutable part of a [`Session`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub node_id: String,
    pub roles: RoleSet,
}

/// Session record as stored in `session:{id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub node_id: String,
}

impl SessionRecord {
    /// Parse a stored hash
    ///
    /// An empty hash, or one without a non-zero `user_id`, means "no record".
    pub fn from_hash(hash: &HashMap<String, String>) -> Option<Self> {
        let user_id = hash
            .get(fields::USER_ID)
            .and_then(|v| UserId::parse(v).ok())
            .filter(|id| !id.is_zero())?;

        Some(Self {
            user_id,
            room_id: hash
                .get(fields::ROOM_ID)
                .and_then(|v| RoomId::parse(v).ok())
                .unwrap_or_default(),
            node_id: hash.get(fields::NODE_ID).cloned().unwrap_or_default(),
        })
    }
}

/// One logical client session
#[derive(Debug)]
pub struct Session {
    id: String,
    state: RwLock<SessionState>,
}

impl Session {
    /// Generate a new session ID
    #[must_use]
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Placeholder session attached to a socket before it authenticates
    pub fn anonymous(node_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: Self::generate_id(),
            state: RwLock::new(SessionState {
                node_id: node_id.into(),
                ..SessionState::default()
            }),
        })
    }

    /// Rebuild a reclaimed session from its stored record, owned by `node_id`
    ///
    /// The stored room is not marked; the session enters it only once the rejoin
    /// commits.
    pub fn restore(id: impl Into<String>, record: &SessionRecord, node_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            state: RwLock::new(SessionState {
                user_id: record.user_id,
                room_id: RoomId::NONE,
                node_id: node_id.into(),
                roles: RoleSet::new(),
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> UserId {
        self.state.read().user_id
    }

    pub fn set_user_id(&self, user_id: UserId) {
        self.state.write().user_id = user_id;
    }

    pub fn is_authenticated(&self) -> bool {
        !self.user_id().is_zero()
    }

    pub fn room_id(&self) -> RoomId {
        self.state.read().room_id
    }

    /// Mark the session as inside `room_id`
    ///
    /// Only call after the store membership writes for that room have committed.
    pub fn enter_room(&self, room_id: RoomId, roles: RoleSet) {
        let mut state = self.state.write();
        state.room_id = room_id;
        state.roles = roles;
    }

    /// Clear the room and the room-scoped roles
    pub fn leave_room(&self) {
        let mut state = self.state.write();
        state.room_id = RoomId::NONE;
        state.roles = RoleSet::new();
    }

    pub fn node_id(&self) -> String {
        self.state.read().node_id.clone()
    }

    pub fn set_node_id(&self, node_id: impl Into<String>) {
        self.state.write().node_id = node_id.into();
    }

    pub fn roles(&self) -> RoleSet {
        self.state.read().roles.clone()
    }

    pub fn add_role(&self, role: RoleId) -> bool {
        self.state.write().roles.add(role)
    }

    pub fn remove_role(&self, role: RoleId) -> bool {
        self.state.write().roles.remove(role)
    }

    pub fn permissions(&self) -> Permissions {
        self.state.read().roles.permissions()
    }

    pub fn has_permission(&self, permission: Permissions) -> bool {
        self.permissions().has(permission)
    }

    /// Consistent copy of the whole state
    pub fn snapshot(&self) -> SessionState {
        self.state.read().clone()
    }

    /// Fields written to `session:{id}`
    pub fn record_fields(&self) -> Vec<(&'static str, String)> {
        let state = self.state.read();
        vec![
            (fields::ID, self.id.clone()),
            (fields::USER_ID, state.user_id.to_string()),
            (fields::ROOM_ID, state.room_id.to_string()),
            (fields::NODE_ID, state.node_id.clone()),
        ]
    }
}
