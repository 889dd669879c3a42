//! Value objects - immutable types that represent domain concepts

mod ids;
mod permissions;
mod roles;

pub use ids::{IdParseError, RoomId, UserId};
pub use permissions::Permissions;
pub use roles::{Role, RoleId, RoleSet};
