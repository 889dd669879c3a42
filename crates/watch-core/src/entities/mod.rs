//! Domain entities - core business objects

mod media;
mod player;
mod room;
mod user;

pub use media::{MediaItem, MediaItemInfo, MediaItemType};
pub use player::PlayerState;
pub use room::{Room, RoomMember, UserRole};
pub use user::User;
