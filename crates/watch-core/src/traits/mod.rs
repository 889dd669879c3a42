//! Traits (ports) implemented by the infrastructure layers

mod media;
mod repositories;

pub use media::{BasicMediaInfo, MediaInfoProvider};
pub use repositories::{RepoResult, RoleRepository, RoomRepository, UserRepository};
