//! The key-value store contract shared by every gateway node
//!
//! All values are strings. Missing keys read as empty (empty hash, empty set,
//! `None`), never as errors.

mod batch;
mod memory;
mod redis_store;
mod scripts;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub use batch::{StoreCommand, WriteBatch};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use scripts::EndVote;

use crate::pool::RedisPoolError;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    Pool(#[from] RedisPoolError),

    #[error("Store command error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Wrong value type at key {0}")]
    WrongType(String),
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::Pool(RedisPoolError::GetConnection(err))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    // ------------------------------------------------------------------
    // Hashes
    // ------------------------------------------------------------------
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()>;

    /// Returns true if the field existed
    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool>;

    // ------------------------------------------------------------------
    // Sets
    // ------------------------------------------------------------------
    /// Returns true if the member was newly added
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Returns true if the member was present
    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn scard(&self, key: &str) -> StoreResult<usize>;

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool>;

    // ------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------
    /// Returns the new length
    async fn rpush(&self, key: &str, value: &str) -> StoreResult<usize>;

    async fn lpop(&self, key: &str) -> StoreResult<Option<String>>;

    async fn llen(&self, key: &str) -> StoreResult<usize>;

    async fn lrange(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Remove up to `count` occurrences from the head, returns how many were removed
    async fn lrem(&self, key: &str, count: usize, value: &str) -> StoreResult<usize>;

    // ------------------------------------------------------------------
    // Keys and TTL
    // ------------------------------------------------------------------
    async fn del(&self, key: &str) -> StoreResult<bool>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Clear a TTL, returns true if one was set
    async fn persist(&self, key: &str) -> StoreResult<bool>;

    /// Remaining TTL, `None` if the key is missing or has no TTL
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    // ------------------------------------------------------------------
    // Pipelines
    // ------------------------------------------------------------------
    /// Apply every write of the batch in one round trip, all or nothing
    async fn apply(&self, batch: WriteBatch) -> StoreResult<()>;

    /// `SMEMBERS` for each key in one round trip, results in key order
    async fn smembers_many(&self, keys: &[String]) -> StoreResult<Vec<Vec<String>>>;

    /// `HGET field` for each key in one round trip, results in key order
    async fn hget_many(&self, keys: &[String], field: &str) -> StoreResult<Vec<Option<String>>>;

    // ------------------------------------------------------------------
    // Atomic scripts
    // ------------------------------------------------------------------
    /// Remove `member` from the set at `key` only while the set at `guard` is empty
    ///
    /// Returns true if the member was removed.
    async fn srem_unless_guarded(&self, key: &str, member: &str, guard: &str) -> StoreResult<bool>;

    /// Record an end-of-item vote, returns true for the one vote that carries the advance
    async fn vote_item_end(&self, vote: &EndVote<'_>) -> StoreResult<bool>;
}
