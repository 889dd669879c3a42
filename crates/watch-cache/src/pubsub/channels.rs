//! Pub/Sub channel definitions.
//!
//! Defines the topic naming conventions shared by every node.

use watch_core::{RoomId, UserId};

/// Topic prefix for a single gateway node
pub const NODE_CHANNEL_PREFIX: &str = "gateway:";
/// Topic prefix for room fan-out
pub const ROOM_CHANNEL_PREFIX: &str = "room:";
/// Topic prefix for everything addressed to a user
pub const USER_CHANNEL_PREFIX: &str = "user:";
/// Topic prefix for a single session, wherever it is connected
pub const SESSION_CHANNEL_PREFIX: &str = "session:";
/// Topic every node listens on
pub const BROADCAST_CHANNEL: &str = "broadcast";

/// Pub/Sub topic types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PubSubChannel {
    /// Messages for one gateway node
    Node(String),
    /// Fleet-wide broadcast
    Broadcast,
    /// Messages for every member of a room
    Room(RoomId),
    /// Messages for every session of a user
    User(UserId),
    /// Messages for one session
    Session(String),
    /// Custom channel name
    Custom(String),
}

impl PubSubChannel {
    #[must_use]
    pub fn node(node_id: impl Into<String>) -> Self {
        Self::Node(node_id.into())
    }

    #[must_use]
    pub fn broadcast() -> Self {
        Self::Broadcast
    }

    #[must_use]
    pub fn room(room_id: RoomId) -> Self {
        Self::Room(room_id)
    }

    #[must_use]
    pub fn user(user_id: UserId) -> Self {
        Self::User(user_id)
    }

    #[must_use]
    pub fn session(session_id: impl Into<String>) -> Self {
        Self::Session(session_id.into())
    }

    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// Get the wire topic name
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Node(id) => format!("{NODE_CHANNEL_PREFIX}{id}"),
            Self::Broadcast => BROADCAST_CHANNEL.to_string(),
            Self::Room(id) => format!("{ROOM_CHANNEL_PREFIX}{id}"),
            Self::User(id) => format!("{USER_CHANNEL_PREFIX}{id}"),
            Self::Session(id) => format!("{SESSION_CHANNEL_PREFIX}{id}"),
            Self::Custom(name) => name.clone(),
        }
    }

    /// Parse a topic name back to a `PubSubChannel`
    #[must_use]
    pub fn parse(name: &str) -> Self {
        if name == BROADCAST_CHANNEL {
            return Self::Broadcast;
        }

        if let Some(id) = name.strip_prefix(NODE_CHANNEL_PREFIX) {
            if !id.is_empty() {
                return Self::Node(id.to_string());
            }
        }

        if let Some(id) = name.strip_prefix(SESSION_CHANNEL_PREFIX) {
            if !id.is_empty() {
                return Self::Session(id.to_string());
            }
        }

        if let Some(Ok(id)) = name.strip_prefix(ROOM_CHANNEL_PREFIX).map(RoomId::parse) {
            return Self::Room(id);
        }

        if let Some(Ok(id)) = name.strip_prefix(USER_CHANNEL_PREFIX).map(UserId::parse) {
            return Self::User(id);
        }

        Self::Custom(name.to_string())
    }
}

impl std::fmt::Display for PubSubChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
