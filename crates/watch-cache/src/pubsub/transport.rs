//! The pub/sub transport contract

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::PubSubChannel;
use crate::pool::RedisPoolError;

/// Error type for pub/sub operations
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] RedisPoolError),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Connection error: {0}")]
    Connection(String),
}

pub type PubSubResult<T> = Result<T, PubSubError>;

/// Message received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub channel: PubSubChannel,
    pub payload: Vec<u8>,
}

impl ReceivedMessage {
    #[must_use]
    pub fn new(channel: PubSubChannel, payload: Vec<u8>) -> Self {
        Self { channel, payload }
    }

    pub(crate) fn from_redis(channel_name: &str, payload: Vec<u8>) -> Self {
        Self::new(PubSubChannel::parse(channel_name), payload)
    }
}

/// Topic-based publish/subscribe between gateway nodes.
///
/// Delivery is at-most-once. Messages published by one client on one topic
/// arrive in publish order.
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// Publish an opaque payload to a topic
    async fn publish(&self, channel: &PubSubChannel, payload: &[u8]) -> PubSubResult<()>;

    /// Publish several payloads, in order
    async fn publish_many(&self, messages: &[(PubSubChannel, Vec<u8>)]) -> PubSubResult<()> {
        for (channel, payload) in messages {
            self.publish(channel, payload).await?;
        }
        Ok(())
    }

    /// Start receiving messages on the given topics.
    ///
    /// Returns once the subscription is active.
    async fn subscribe(&self, channels: &[PubSubChannel]) -> PubSubResult<()>;

    /// Stop receiving messages on the given topics
    async fn unsubscribe(&self, channels: &[PubSubChannel]) -> PubSubResult<()>;

    /// Stream of every message received on this client's topics
    fn receiver(&self) -> broadcast::Receiver<ReceivedMessage>;
}
