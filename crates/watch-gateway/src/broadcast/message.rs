//! Dispatch envelope
//!
//! A [`Message`] wraps a [`Packet`] with its routing: the kind of delivery, the
//! node that produced it, and the target filters. Between nodes it travels as CBOR.

use crate::connection::Session;
use crate::protocol::{OpCode, Packet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use watch_core::{Permissions, RoomId, UserId};

/// How a message is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessageKind {
    /// Routed to the sessions named by the target
    #[default]
    Normal,
    /// Every connected socket in the fleet
    Broadcast,
    /// Consumed by server handlers, never written to a socket
    Server,
}

/// Filters a session must pass to receive a message
///
/// Every present filter must pass. Local and remote delivery both go through
/// [`MessageTarget::accepts`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTarget {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_ids: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub ignored_session_ids: HashSet<String>,
    #[serde(default)]
    pub permissions: Permissions,
}

impl MessageTarget {
    pub fn accepts(&self, session: &Session) -> bool {
        if self.ignored_session_ids.contains(session.id()) {
            return false;
        }

        let state = session.snapshot();
        if !self.user_ids.is_empty() && !self.user_ids.contains(&state.user_id) {
            return false;
        }
        if self.room_id.is_some_and(|room_id| room_id != state.room_id) {
            return false;
        }
        self.permissions.is_empty() || state.roles.permissions().contains(self.permissions)
    }
}

/// Error when encoding or decoding a message for the transport
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to encode message: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("Failed to decode message: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),
}

/// A packet plus its routing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Node that dispatched the message, set by the dispatcher
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub target: MessageTarget,
    pub data: Packet,
}

impl Message {
    /// Targeted message
    #[must_use]
    pub fn new(data: Packet) -> Self {
        Self {
            kind: MessageKind::Normal,
            origin: String::new(),
            target: MessageTarget::default(),
            data,
        }
    }

    #[must_use]
    pub fn broadcast(data: Packet) -> Self {
        Self {
            kind: MessageKind::Broadcast,
            ..Self::new(data)
        }
    }

    #[must_use]
    pub fn server(data: Packet) -> Self {
        Self {
            kind: MessageKind::Server,
            ..Self::new(data)
        }
    }

    #[must_use]
    pub fn to_users(mut self, user_ids: impl IntoIterator<Item = UserId>) -> Self {
        self.target.user_ids.extend(user_ids);
        self
    }

    #[must_use]
    pub fn in_room(mut self, room_id: RoomId) -> Self {
        self.target.room_id = Some(room_id);
        self
    }

    #[must_use]
    pub fn ignoring(mut self, session_id: impl Into<String>) -> Self {
        self.target.ignored_session_ids.insert(session_id.into());
        self
    }

    #[must_use]
    pub fn requiring(mut self, permissions: Permissions) -> Self {
        self.target.permissions |= permissions;
        self
    }

    pub fn op(&self) -> OpCode {
        self.data.op
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)?;
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(ciborium::from_reader(bytes)?)
    }
}
