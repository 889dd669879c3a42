//! Typed packet payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;
use watch_core::{Permissions, RoleId, Room, RoomMember, UserId};

/// Authenticate (op=0) from the client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatePayload {
    #[serde(default)]
    pub token: String,
    /// Session to reclaim after a reconnect
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Authenticate (op=0) reply
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedPayload {
    pub session_id: String,
}

/// JoinRoom (op=2) reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomResponse {
    pub status: u16,
    pub room: Room,
    pub members: Vec<RoomMember>,
    pub permissions: Permissions,
}

/// AddRole / RemoveRole (op=13/14)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdatePayload {
    pub user_id: UserId,
    pub role_id: RoleId,
}

/// PlayerState (op=7) from the client
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatePayload {
    pub playing: bool,
    pub current_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    JoinRequest,
}

/// AddNotification (op=18)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub data: Value,
}

/// SessionTakeover (op=20), published on `session:{id}` when a session is reclaimed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTakeoverPayload {
    pub session_id: String,
    /// The connection that now owns the session
    pub connection_id: uuid::Uuid,
}
