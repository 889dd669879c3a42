//! Room database models

use sqlx::FromRow;

/// Database model for rooms table
#[derive(Debug, Clone, FromRow)]
pub struct RoomModel {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub private: bool,
}

/// Database model for user_roles table
#[derive(Debug, Clone, FromRow)]
pub struct UserRoleModel {
    pub id: i64,
    pub user_id: i64,
    pub room_id: i64,
    pub role_id: i32,
}
