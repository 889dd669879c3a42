//! Redis implementation of [`KeyValueStore`]

use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use super::scripts::{SREM_UNLESS_GUARDED, VOTE_ITEM_END};
use crate::keys::item_fields;
use super::{EndVote, KeyValueStore, StoreCommand, StoreResult, WriteBatch};
use crate::pool::RedisPool;

/// Store backed by a pooled Redis connection
#[derive(Debug, Clone)]
pub struct RedisStore {
    pool: RedisPool,
    srem_unless_guarded: redis::Script,
    vote_item_end: redis::Script,
}

impl RedisStore {
    #[must_use]
    pub fn new(pool: RedisPool) -> Self {
        Self {
            pool,
            srem_unless_guarded: redis::Script::new(SREM_UNLESS_GUARDED),
            vote_item_end: redis::Script::new(VOTE_ITEM_END),
        }
    }

    async fn conn(&self) -> StoreResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

fn build_pipeline(batch: WriteBatch) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();

    for command in batch.into_commands() {
        match command {
            StoreCommand::HSet { key, fields } => {
                pipe.hset_multiple(key, &fields).ignore();
            }
            StoreCommand::HDel { key, field } => {
                pipe.hdel(key, field).ignore();
            }
            StoreCommand::Del { key } => {
                pipe.del(key).ignore();
            }
            StoreCommand::SAdd { key, member } => {
                pipe.sadd(key, member).ignore();
            }
            StoreCommand::SRem { key, member } => {
                pipe.srem(key, member).ignore();
            }
            StoreCommand::RPush { key, value } => {
                pipe.rpush(key, value).ignore();
            }
            StoreCommand::Expire { key, ttl } => {
                pipe.expire(key, ttl_secs(ttl)).ignore();
            }
            StoreCommand::Persist { key } => {
                pipe.persist(key).ignore();
            }
        }
    }

    pipe
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.hget(key, field).await?)
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn().await?;
        Ok(conn.hgetall(key).await?)
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        conn.hset_multiple::<_, _, _, ()>(key, fields).await?;
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: usize = conn.hdel(key, field).await?;
        Ok(removed > 0)
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let added: usize = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: usize = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.smembers(key).await?)
    }

    async fn scard(&self, key: &str) -> StoreResult<usize> {
        let mut conn = self.conn().await?;
        Ok(conn.scard(key).await?)
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.sismember(key, member).await?)
    }

    async fn rpush(&self, key: &str, value: &str) -> StoreResult<usize> {
        let mut conn = self.conn().await?;
        Ok(conn.rpush(key, value).await?)
    }

    async fn lpop(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.lpop(key, None::<NonZeroUsize>).await?)
    }

    async fn llen(&self, key: &str) -> StoreResult<usize> {
        let mut conn = self.conn().await?;
        Ok(conn.llen(key).await?)
    }

    async fn lrange(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.lrange(key, 0, -1).await?)
    }

    async fn lrem(&self, key: &str, count: usize, value: &str) -> StoreResult<usize> {
        let mut conn = self.conn().await?;
        let count = isize::try_from(count).unwrap_or(isize::MAX);
        Ok(conn.lrem(key, count, value).await?)
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let deleted: usize = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.exists(key).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.expire(key, ttl_secs(ttl)).await?)
    }

    async fn persist(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.persist(key).await?)
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut conn = self.conn().await?;
        let ttl: i64 = conn.ttl(key).await?;
        // Redis returns -2 if the key doesn't exist, -1 if it has no TTL
        Ok(u64::try_from(ttl).ok().map(Duration::from_secs))
    }

    async fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let commands = batch.len();
        let pipe = build_pipeline(batch);

        let mut conn = self.conn().await?;
        pipe.query_async::<()>(&mut conn).await?;

        tracing::trace!(commands, "Applied write batch");
        Ok(())
    }

    async fn smembers_many(&self, keys: &[String]) -> StoreResult<Vec<Vec<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.smembers(key);
        }

        let mut conn = self.conn().await?;
        Ok(pipe.query_async(&mut conn).await?)
    }

    async fn hget_many(&self, keys: &[String], field: &str) -> StoreResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.hget(key, field);
        }

        let mut conn = self.conn().await?;
        Ok(pipe.query_async(&mut conn).await?)
    }

    async fn srem_unless_guarded(&self, key: &str, member: &str, guard: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = self
            .srem_unless_guarded
            .key(key)
            .key(guard)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn vote_item_end(&self, vote: &EndVote<'_>) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let won: i64 = self
            .vote_item_end
            .key(vote.item_key)
            .key(vote.votes_key)
            .key(vote.voters_key)
            .arg(vote.item_id)
            .arg(vote.voter)
            .arg(item_fields::ID)
            .arg(item_fields::ENDED)
            .invoke_async(&mut conn)
            .await?;
        Ok(won == 1)
    }
}
