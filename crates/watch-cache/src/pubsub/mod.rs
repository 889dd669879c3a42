//! Pub/Sub module.
//!
//! Cross-node fan-out: the transport contract, its Redis and in-memory
//! implementations, and the reference-counted subscription manager.

mod channels;
mod memory;
mod redis_transport;
mod subscriber;
mod subscriptions;
mod transport;

pub use channels::{
    PubSubChannel, BROADCAST_CHANNEL, NODE_CHANNEL_PREFIX, ROOM_CHANNEL_PREFIX,
    SESSION_CHANNEL_PREFIX, USER_CHANNEL_PREFIX,
};
pub use memory::{MemoryBroker, MemoryPubSub};
pub use redis_transport::RedisPubSub;
pub use subscriber::{Subscriber, SubscriberConfig};
pub use subscriptions::SubscriptionManager;
pub use transport::{PubSubError, PubSubResult, PubSubTransport, ReceivedMessage};
