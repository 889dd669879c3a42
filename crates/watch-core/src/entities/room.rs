//! Room entity plus membership records

use serde::{Deserialize, Serialize};

use super::User;
use crate::value_objects::{RoleId, RoomId, UserId};

/// Room entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub owner_id: UserId,
    /// Private rooms require an accepted join request
    pub private: bool,
}

impl Room {
    #[inline]
    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }
}

/// A user as seen from inside a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMember {
    pub user: User,
    pub roles: Vec<RoleId>,
}

/// A role grant for one user in one room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRole {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub role_id: RoleId,
}
