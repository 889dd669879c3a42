//! # watch-core
//!
//! Domain layer containing ids, permissions, the built-in role table, entities and
//! repository traits for the watch-party gateway.
//! This crate has zero dependencies on infrastructure (database, cache, web framework, etc.).

pub mod entities;
pub mod error;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    MediaItem, MediaItemInfo, MediaItemType, PlayerState, Room, RoomMember, User, UserRole,
};
pub use error::DomainError;
pub use traits::{
    BasicMediaInfo, MediaInfoProvider, RepoResult, RoleRepository, RoomRepository,
    UserRepository,
};
pub use value_objects::{IdParseError, Permissions, Role, RoleId, RoleSet, RoomId, UserId};
