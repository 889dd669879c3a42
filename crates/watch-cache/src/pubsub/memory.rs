//! In-memory pub/sub backend using `tokio::sync::broadcast`
//!
//! One [`MemoryBroker`] plays the role of the Redis server; every simulated
//! node gets its own [`MemoryPubSub`] client from it.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};

use super::{PubSubChannel, PubSubError, PubSubResult, PubSubTransport, ReceivedMessage};

const DEFAULT_BUFFER_SIZE: usize = 4096;

type ClientSender = (u64, broadcast::Sender<ReceivedMessage>);

/// Shared topic table for a set of in-process clients
pub struct MemoryBroker {
    topics: DashMap<String, Vec<ClientSender>>,
    next_client: AtomicU64,
    buffer_size: usize,
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    #[must_use]
    pub fn with_buffer_size(buffer_size: usize) -> Arc<Self> {
        Arc::new(Self {
            topics: DashMap::new(),
            next_client: AtomicU64::new(1),
            buffer_size,
        })
    }

    /// Create a new client connected to this broker
    #[must_use]
    pub fn client(self: &Arc<Self>) -> MemoryPubSub {
        let (tx, _) = broadcast::channel(self.buffer_size);
        MemoryPubSub {
            id: self.next_client.fetch_add(1, Ordering::Relaxed),
            broker: Arc::clone(self),
            tx,
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
            publish_calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            stalled: Mutex::new(None),
        }
    }

    /// Number of clients subscribed to a topic
    #[must_use]
    pub fn subscriber_count(&self, channel: &PubSubChannel) -> usize {
        self.topics.get(&channel.name()).map_or(0, |subs| subs.len())
    }

    fn deliver(&self, channel: &PubSubChannel, payload: &[u8]) -> usize {
        let Some(subscribers) = self.topics.get(&channel.name()) else {
            return 0;
        };
        for (_, tx) in subscribers.iter() {
            // A client without a live receiver just drops the message
            let _ = tx.send(ReceivedMessage::new(channel.clone(), payload.to_vec()));
        }
        subscribers.len()
    }

    fn attach(&self, client: u64, tx: &broadcast::Sender<ReceivedMessage>, channel: &PubSubChannel) {
        let mut subscribers = self.topics.entry(channel.name()).or_default();
        if !subscribers.iter().any(|(id, _)| *id == client) {
            subscribers.push((client, tx.clone()));
        }
    }

    fn detach(&self, client: u64, channel: &PubSubChannel) {
        let name = channel.name();
        if let Some(mut subscribers) = self.topics.get_mut(&name) {
            subscribers.retain(|(id, _)| *id != client);
        }
        self.topics.remove_if(&name, |_, subscribers| subscribers.is_empty());
    }
}

/// One node's connection to a [`MemoryBroker`]
pub struct MemoryPubSub {
    id: u64,
    broker: Arc<MemoryBroker>,
    tx: broadcast::Sender<ReceivedMessage>,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    publish_calls: AtomicUsize,
    failing: AtomicBool,
    stalled: Mutex<Option<(PubSubChannel, Arc<Notify>)>>,
}

impl MemoryPubSub {
    /// Standalone client on its own broker
    #[must_use]
    pub fn new() -> Self {
        MemoryBroker::new().client()
    }

    /// Whether this client currently receives a topic
    #[must_use]
    pub fn is_subscribed(&self, channel: &PubSubChannel) -> bool {
        self.broker
            .topics
            .get(&channel.name())
            .is_some_and(|subs| subs.iter().any(|(id, _)| *id == self.id))
    }

    /// Topics subscribed through this client, one count per topic
    #[must_use]
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent subscribe and unsubscribe fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Hold every subscribe that includes `channel` until the returned gate is notified
    pub fn stall(&self, channel: PubSubChannel) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.stalled.lock() = Some((channel, gate.clone()));
        gate
    }

    fn check_failing(&self) -> PubSubResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PubSubError::Connection("transport unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubTransport for MemoryPubSub {
    async fn publish(&self, channel: &PubSubChannel, payload: &[u8]) -> PubSubResult<()> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        let receivers = self.broker.deliver(channel, payload);
        tracing::trace!(channel = %channel, receivers, "Published in-memory message");
        Ok(())
    }

    async fn subscribe(&self, channels: &[PubSubChannel]) -> PubSubResult<()> {
        let gate = self
            .stalled
            .lock()
            .as_ref()
            .filter(|(channel, _)| channels.contains(channel))
            .map(|(_, gate)| gate.clone());
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check_failing()?;
        for channel in channels {
            self.broker.attach(self.id, &self.tx, channel);
        }
        self.subscribe_calls.fetch_add(channels.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn unsubscribe(&self, channels: &[PubSubChannel]) -> PubSubResult<()> {
        self.check_failing()?;
        for channel in channels {
            self.broker.detach(self.id, channel);
        }
        self.unsubscribe_calls.fetch_add(channels.len(), Ordering::SeqCst);
        Ok(())
    }

    fn receiver(&self) -> broadcast::Receiver<ReceivedMessage> {
        self.tx.subscribe()
    }
}
