//! Gateway operation codes
//!
//! The same numbering is used on client sockets and inside pub/sub messages.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Gateway operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Authenticate with a bearer token, optionally reclaiming a session (client/server)
    Authenticate = 0,
    /// Synthesized when a socket closes (server internal)
    Disconnect = 1,
    /// Join a room (client/server)
    JoinRoom = 2,
    /// Leave the current room (client only)
    LeaveRoom = 3,
    /// Accept a pending join request (client), notify the requester (server)
    RoomJoinRequest = 4,
    /// Queue an item (client/server)
    QueueAdd = 5,
    /// Remove a queued item (client/server)
    QueueRemove = 6,
    /// Play / pause with a position (client/server)
    PlayerState = 7,
    /// Jump to a position (client/server)
    Seek = 8,
    /// Skip to the next item (client only)
    VideoSkip = 9,
    /// The current item finished on this client (client only)
    VideoEnd = 10,
    /// The current item changed (server only)
    VideoSet = 11,
    /// Kick a member (client), kick notice (server)
    KickUser = 12,
    /// Grant a role (client/server)
    AddRole = 13,
    /// Revoke a role (client/server)
    RemoveRole = 14,
    /// New permission bits for this session (server only)
    UpdatePermissions = 15,
    /// A member joined (server only)
    AddUser = 16,
    /// A member left (server only)
    RemoveUser = 17,
    /// A notification for room managers (server only)
    AddNotification = 18,
    /// Carries an error id (server only)
    Error = 19,
    /// A session was reclaimed on another socket (fleet internal)
    SessionTakeover = 20,
}

impl OpCode {
    /// Create an `OpCode` from a raw integer value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Authenticate),
            1 => Some(Self::Disconnect),
            2 => Some(Self::JoinRoom),
            3 => Some(Self::LeaveRoom),
            4 => Some(Self::RoomJoinRequest),
            5 => Some(Self::QueueAdd),
            6 => Some(Self::QueueRemove),
            7 => Some(Self::PlayerState),
            8 => Some(Self::Seek),
            9 => Some(Self::VideoSkip),
            10 => Some(Self::VideoEnd),
            11 => Some(Self::VideoSet),
            12 => Some(Self::KickUser),
            13 => Some(Self::AddRole),
            14 => Some(Self::RemoveRole),
            15 => Some(Self::UpdatePermissions),
            16 => Some(Self::AddUser),
            17 => Some(Self::RemoveUser),
            18 => Some(Self::AddNotification),
            19 => Some(Self::Error),
            20 => Some(Self::SessionTakeover),
            _ => None,
        }
    }

    /// Get the raw integer value
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if this op code can be sent by the client
    ///
    /// `Disconnect` is never accepted from a socket; it is synthesized on close.
    #[must_use]
    pub const fn is_client_op(self) -> bool {
        matches!(
            self,
            Self::Authenticate
                | Self::JoinRoom
                | Self::LeaveRoom
                | Self::RoomJoinRequest
                | Self::QueueAdd
                | Self::QueueRemove
                | Self::PlayerState
                | Self::Seek
                | Self::VideoSkip
                | Self::VideoEnd
                | Self::KickUser
                | Self::AddRole
                | Self::RemoveRole
        )
    }

    /// Check if this op code only ever travels between nodes
    #[must_use]
    pub const fn is_internal(self) -> bool {
        matches!(self, Self::Disconnect | Self::SessionTakeover)
    }

    /// Get the name of this op code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Authenticate => "Authenticate",
            Self::Disconnect => "Disconnect",
            Self::JoinRoom => "JoinRoom",
            Self::LeaveRoom => "LeaveRoom",
            Self::RoomJoinRequest => "RoomJoinRequest",
            Self::QueueAdd => "QueueAdd",
            Self::QueueRemove => "QueueRemove",
            Self::PlayerState => "PlayerState",
            Self::Seek => "Seek",
            Self::VideoSkip => "VideoSkip",
            Self::VideoEnd => "VideoEnd",
            Self::VideoSet => "VideoSet",
            Self::KickUser => "KickUser",
            Self::AddRole => "AddRole",
            Self::RemoveRole => "RemoveRole",
            Self::UpdatePermissions => "UpdatePermissions",
            Self::AddUser => "AddUser",
            Self::RemoveUser => "RemoveUser",
            Self::AddNotification => "AddNotification",
            Self::Error => "Error",
            Self::SessionTakeover => "SessionTakeover",
        }
    }
}

impl Serialize for OpCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value).ok_or_else(|| serde::de::Error::custom(format!("invalid op code: {value}")))
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u8())
    }
}
