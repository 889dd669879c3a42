//! Store wrapper that fails chosen keys
//!
//! Every node of a test cluster talks to the shared [`MemoryStore`] through it.
//! Until a key is marked failing it is a plain pass-through.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use watch_cache::{
    EndVote, KeyValueStore, MemoryStore, StoreCommand, StoreError, StoreResult, WriteBatch,
};

pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    failing: Mutex<HashSet<String>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        })
    }

    /// Fail every command that touches `key`
    pub fn fail(&self, key: impl Into<String>) {
        self.failing.lock().insert(key.into());
    }

    /// Stop failing every key
    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    fn check<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> StoreResult<()> {
        let failing = self.failing.lock();
        match keys.into_iter().find(|key| failing.contains(*key)) {
            Some(key) => Err(StoreError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection reset",
                key.to_string(),
            )))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KeyValueStore for FaultyStore {
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.check([key])?;
        self.inner.hget(key, field).await
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.check([key])?;
        self.inner.hget_all(key).await
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        self.check([key])?;
        self.inner.hset(key, fields).await
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        self.check([key])?;
        self.inner.hdel(key, field).await
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.check([key])?;
        self.inner.sadd(key, member).await
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.check([key])?;
        self.inner.srem(key, member).await
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        self.check([key])?;
        self.inner.smembers(key).await
    }

    async fn scard(&self, key: &str) -> StoreResult<usize> {
        self.check([key])?;
        self.inner.scard(key).await
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.check([key])?;
        self.inner.sismember(key, member).await
    }

    async fn rpush(&self, key: &str, value: &str) -> StoreResult<usize> {
        self.check([key])?;
        self.inner.rpush(key, value).await
    }

    async fn lpop(&self, key: &str) -> StoreResult<Option<String>> {
        self.check([key])?;
        self.inner.lpop(key).await
    }

    async fn llen(&self, key: &str) -> StoreResult<usize> {
        self.check([key])?;
        self.inner.llen(key).await
    }

    async fn lrange(&self, key: &str) -> StoreResult<Vec<String>> {
        self.check([key])?;
        self.inner.lrange(key).await
    }

    async fn lrem(&self, key: &str, count: usize, value: &str) -> StoreResult<usize> {
        self.check([key])?;
        self.inner.lrem(key, count, value).await
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        self.check([key])?;
        self.inner.del(key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.check([key])?;
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.check([key])?;
        self.inner.expire(key, ttl).await
    }

    async fn persist(&self, key: &str) -> StoreResult<bool> {
        self.check([key])?;
        self.inner.persist(key).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.check([key])?;
        self.inner.ttl(key).await
    }

    async fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        self.check(batch.commands().iter().map(StoreCommand::key))?;
        self.inner.apply(batch).await
    }

    async fn smembers_many(&self, keys: &[String]) -> StoreResult<Vec<Vec<String>>> {
        self.check(keys.iter().map(String::as_str))?;
        self.inner.smembers_many(keys).await
    }

    async fn hget_many(&self, keys: &[String], field: &str) -> StoreResult<Vec<Option<String>>> {
        self.check(keys.iter().map(String::as_str))?;
        self.inner.hget_many(keys, field).await
    }

    async fn srem_unless_guarded(&self, key: &str, member: &str, guard: &str) -> StoreResult<bool> {
        self.check([key, guard])?;
        self.inner.srem_unless_guarded(key, member, guard).await
    }

    async fn vote_item_end(&self, vote: &EndVote<'_>) -> StoreResult<bool> {
        self.check([vote.item_key, vote.votes_key, vote.voters_key])?;
        self.inner.vote_item_end(vote).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fails_only_marked_keys() {
        let store = FaultyStore::new(Arc::new(MemoryStore::new()));
        store.fail("session:a");

        assert!(store.hget_all("session:a").await.is_err());
        assert!(store.apply(WriteBatch::new().persist("session:a")).await.is_err());
        assert!(store.sadd("room:1:users", "7").await.unwrap());

        store.heal();
        assert!(store.hget_all("session:a").await.unwrap().is_empty());
    }
}
