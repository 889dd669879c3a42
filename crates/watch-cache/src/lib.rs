//! # watch-cache
//!
//! Shared key-value store and pub/sub transport used by every gateway node.
//!
//! ## Features
//!
//! - **Connection Pool**: Managed Redis connection pool with deadpool
//! - **Key-Value Store**: The [`KeyValueStore`] contract (hashes, sets, lists, TTLs,
//!   pipelined batches) with a Redis and an in-memory implementation
//! - **Key Schema**: Builders for every session and room key
//! - **Pub/Sub**: The [`PubSubTransport`] contract with a Redis and an in-memory
//!   implementation, plus the reference-counted [`SubscriptionManager`]
//!
//! ## Example
//!
//! ```ignore
//! use watch_cache::{keys, KeyValueStore, RedisPool, RedisStore, WriteBatch};
//!
//! let pool = RedisPool::from_config(&config.redis)?;
//! let store = RedisStore::new(pool);
//!
//! let batch = WriteBatch::new()
//!     .sadd(keys::room_users(room_id), user_id.to_string())
//!     .hset(keys::session(&session_id), keys::fields::ROOM_ID, room_id.to_string());
//! store.apply(batch).await?;
//! ```

pub mod keys;
pub mod pool;
pub mod pubsub;
pub mod store;

// Re-export pool types
pub use pool::{RedisPool, RedisPoolError, RedisResult};

// Re-export store types
pub use store::{
    EndVote, KeyValueStore, MemoryStore, RedisStore, StoreCommand, StoreError, StoreResult,
    WriteBatch,
};

// Re-export pubsub types
pub use pubsub::{
    MemoryBroker, MemoryPubSub, PubSubChannel, PubSubError, PubSubResult, PubSubTransport,
    ReceivedMessage, RedisPubSub, Subscriber, SubscriberConfig,
    SubscriptionManager, BROADCAST_CHANNEL, NODE_CHANNEL_PREFIX, ROOM_CHANNEL_PREFIX,
    SESSION_CHANNEL_PREFIX, USER_CHANNEL_PREFIX,
};
