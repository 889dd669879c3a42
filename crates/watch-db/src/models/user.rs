//! User database models

use sqlx::FromRow;

/// `users` joined with `discriminators`
#[derive(Debug, Clone, FromRow)]
pub struct UserModel {
    pub id: i64,
    pub username: String,
    pub discriminator: Option<String>,
    pub avatar: Option<String>,
}

/// A user plus the role ids they hold in one room
#[derive(Debug, Clone, FromRow)]
pub struct RoomMemberRow {
    pub id: i64,
    pub username: String,
    pub discriminator: Option<String>,
    pub avatar: Option<String>,
    pub role_ids: Vec<i32>,
}
