//! # watch-db
//!
//! Database layer implementing the read side of users and rooms plus role
//! grants with PostgreSQL via SQLx.
//!
//! ## Overview
//!
//! - Connection pool management
//! - Database models with SQLx `FromRow` derives
//! - Model → entity mappers
//! - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use watch_db::{create_pool, PgUserRepository};
//! use watch_core::UserRepository;
//!
//! let pool = create_pool(&config.database).await?;
//! let users = PgUserRepository::new(pool);
//! let user = users.find_by_id(user_id).await?;
//! ```

pub mod mappers;
pub mod models;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, PgPool};
pub use repositories::{PgRoleRepository, PgRoomRepository, PgUserRepository};

/// Schema the repositories query against
pub const SCHEMA: &str = include_str!("../migrations/0001_gateway_schema.sql");
