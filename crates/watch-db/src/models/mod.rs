//! Database models - SQLx-compatible structs for PostgreSQL tables

mod room;
mod user;

pub use room::{RoomModel, UserRoleModel};
pub use user::{RoomMemberRow, UserModel};
