//! Repository implementations
//!
//! PostgreSQL implementations of the repository traits defined in watch-core.

mod error;
mod role;
mod room;
mod user;

pub use role::PgRoleRepository;
pub use room::PgRoomRepository;
pub use user::PgUserRepository;
