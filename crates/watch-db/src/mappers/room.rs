//! Room model -> entity mappers

use watch_core::{RoleId, Room, RoomId, UserId, UserRole};

use crate::models::{RoomModel, UserRoleModel};

impl From<RoomModel> for Room {
    fn from(model: RoomModel) -> Self {
        Room {
            id: RoomId::new(model.id),
            name: model.name,
            owner_id: UserId::new(model.owner_id),
            private: model.private,
        }
    }
}

impl From<UserRoleModel> for UserRole {
    fn from(model: UserRoleModel) -> Self {
        UserRole {
            user_id: UserId::new(model.user_id),
            room_id: RoomId::new(model.room_id),
            role_id: RoleId::new(model.role_id),
        }
    }
}
