//! Database connection pool management

mod postgres;

pub use postgres::{create_pool, ACQUIRE_TIMEOUT};

pub use sqlx::postgres::PgPool;
