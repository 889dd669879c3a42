//! User model -> entity mappers

use watch_core::{RoleId, RoomMember, User, UserId};

use crate::models::{RoomMemberRow, UserModel};

/// Shown for users without a discriminator row
pub const DEFAULT_DISCRIMINATOR: &str = "0000";

impl From<UserModel> for User {
    fn from(model: UserModel) -> Self {
        User {
            id: UserId::new(model.id),
            username: model.username,
            discriminator: model
                .discriminator
                .unwrap_or_else(|| DEFAULT_DISCRIMINATOR.to_string()),
            avatar: model.avatar,
        }
    }
}

impl From<RoomMemberRow> for RoomMember {
    fn from(row: RoomMemberRow) -> Self {
        RoomMember {
            roles: row.role_ids.into_iter().map(RoleId::new).collect(),
            user: User::from(UserModel {
                id: row.id,
                username: row.username,
                discriminator: row.discriminator,
                avatar: row.avatar,
            }),
        }
    }
}
