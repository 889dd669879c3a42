//! [`PubSubTransport`] over Redis
//!
//! Publishing borrows pooled connections; subscriptions live on one dedicated
//! connection owned by the [`Subscriber`] task.

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::broadcast;

use super::{PubSubChannel, PubSubResult, PubSubTransport, ReceivedMessage, Subscriber, SubscriberConfig};
use crate::pool::RedisPool;

pub struct RedisPubSub {
    pool: RedisPool,
    subscriber: Subscriber,
}

impl RedisPubSub {
    /// Start the subscribe connection against the pool's Redis server
    #[must_use]
    pub fn connect(pool: RedisPool, config: SubscriberConfig) -> Self {
        let subscriber = Subscriber::spawn(pool.url(), config);
        Self { pool, subscriber }
    }

    pub async fn shutdown(&self) -> PubSubResult<()> {
        self.subscriber.shutdown().await
    }
}

#[async_trait]
impl PubSubTransport for RedisPubSub {
    async fn publish(&self, channel: &PubSubChannel, payload: &[u8]) -> PubSubResult<()> {
        let mut conn = self.pool.get().await?;
        let receivers: u32 = conn.publish(channel.name(), payload).await?;
        tracing::trace!(channel = %channel, bytes = payload.len(), receivers, "Published message");
        Ok(())
    }

    /// One pipelined round trip, so the order of `messages` is kept
    async fn publish_many(&self, messages: &[(PubSubChannel, Vec<u8>)]) -> PubSubResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;
        publish_pipeline(messages).query_async::<()>(&mut conn).await?;
        tracing::trace!(messages = messages.len(), "Published pipelined messages");
        Ok(())
    }

    async fn subscribe(&self, channels: &[PubSubChannel]) -> PubSubResult<()> {
        self.subscriber.subscribe(channels).await
    }

    async fn unsubscribe(&self, channels: &[PubSubChannel]) -> PubSubResult<()> {
        self.subscriber.unsubscribe(channels).await
    }

    fn receiver(&self) -> broadcast::Receiver<ReceivedMessage> {
        self.subscriber.receiver()
    }
}

fn publish_pipeline(messages: &[(PubSubChannel, Vec<u8>)]) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    for (channel, payload) in messages {
        pipe.publish(channel.name(), payload.as_slice()).ignore();
    }
    pipe
}
