//! Reference-counted topic subscriptions
//!
//! Many local sessions share one transport subscription per topic. The
//! transport is only asked to subscribe on the first reference and to
//! unsubscribe on the last.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{PubSubChannel, PubSubResult, PubSubTransport};

/// Reference count of one topic, locked across its transport calls
type Slot = Arc<Mutex<usize>>;

struct Locked {
    channel: PubSubChannel,
    slot: Slot,
    count: OwnedMutexGuard<usize>,
}

/// Topic -> reference count
///
/// Each topic has its own lock, so a slow transport call only holds up work on
/// the same topic. Multi-topic calls lock in topic name order.
pub struct SubscriptionManager {
    transport: Arc<dyn PubSubTransport>,
    topics: DashMap<PubSubChannel, Slot>,
}

impl SubscriptionManager {
    #[must_use]
    pub fn new(transport: Arc<dyn PubSubTransport>) -> Self {
        Self {
            transport,
            topics: DashMap::new(),
        }
    }

    /// Take one reference on a topic
    pub async fn add(&self, channel: PubSubChannel) -> PubSubResult<()> {
        self.add_many(std::slice::from_ref(&channel)).await
    }

    /// Drop one reference on a topic
    pub async fn remove(&self, channel: &PubSubChannel) -> PubSubResult<()> {
        self.remove_many(std::slice::from_ref(channel)).await
    }

    /// Take one reference on each topic. On transport failure no count changes.
    pub async fn add_many(&self, channels: &[PubSubChannel]) -> PubSubResult<()> {
        let mut locked = self.lock(channels).await;

        let fresh: Vec<PubSubChannel> = locked
            .iter()
            .filter(|topic| *topic.count == 0)
            .map(|topic| topic.channel.clone())
            .collect();

        let result = if fresh.is_empty() {
            Ok(())
        } else {
            self.transport.subscribe(&fresh).await
        };

        if result.is_ok() {
            if !fresh.is_empty() {
                tracing::debug!(channels = ?fresh, "Subscribed topics");
            }
            for topic in &mut locked {
                *topic.count += occurrences(channels, &topic.channel);
            }
        }
        self.release(locked);
        result
    }

    /// Drop one reference on each topic. Unknown topics are ignored.
    pub async fn remove_many(&self, channels: &[PubSubChannel]) -> PubSubResult<()> {
        let mut locked = self.lock(channels).await;

        let mut next = Vec::with_capacity(locked.len());
        for topic in &locked {
            let wanted = occurrences(channels, &topic.channel);
            if *topic.count < wanted {
                tracing::warn!(channel = %topic.channel, "Release of unreferenced topic");
            }
            next.push(topic.count.saturating_sub(wanted));
        }

        let stale: Vec<PubSubChannel> = locked
            .iter()
            .zip(&next)
            .filter(|(topic, n)| *topic.count > 0 && **n == 0)
            .map(|(topic, _)| topic.channel.clone())
            .collect();

        let result = if stale.is_empty() {
            Ok(())
        } else {
            self.transport.unsubscribe(&stale).await
        };

        if result.is_ok() {
            if !stale.is_empty() {
                tracing::debug!(channels = ?stale, "Unsubscribed topics");
            }
            for (topic, n) in locked.iter_mut().zip(next) {
                *topic.count = n;
            }
        }
        self.release(locked);
        result
    }

    /// Current reference count of a topic
    pub async fn count(&self, channel: &PubSubChannel) -> usize {
        let slot = self.topics.get(channel).map(|slot| slot.clone());
        match slot {
            Some(slot) => *slot.lock().await,
            None => 0,
        }
    }

    /// Every topic with at least one reference
    pub async fn channels(&self) -> Vec<PubSubChannel> {
        let slots: Vec<(PubSubChannel, Slot)> = self
            .topics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut channels = Vec::with_capacity(slots.len());
        for (channel, slot) in slots {
            if *slot.lock().await > 0 {
                channels.push(channel);
            }
        }
        channels
    }

    /// Lock every distinct topic of `channels`, in name order
    async fn lock(&self, channels: &[PubSubChannel]) -> Vec<Locked> {
        let mut unique: Vec<&PubSubChannel> = Vec::with_capacity(channels.len());
        for channel in channels {
            if !unique.contains(&channel) {
                unique.push(channel);
            }
        }
        unique.sort_by_cached_key(|channel| channel.name());

        let mut locked = Vec::with_capacity(unique.len());
        for channel in unique {
            loop {
                let slot = self.topics.entry(channel.clone()).or_default().clone();
                let count = slot.clone().lock_owned().await;
                // Dropped from the map while this task waited
                let current = self
                    .topics
                    .get(channel)
                    .is_some_and(|entry| Arc::ptr_eq(entry.value(), &slot));
                if current {
                    locked.push(Locked {
                        channel: channel.clone(),
                        slot,
                        count,
                    });
                    break;
                }
            }
        }
        locked
    }

    /// Unlock topics, forgetting the ones left without references
    fn release(&self, locked: Vec<Locked>) {
        for topic in locked {
            if *topic.count == 0 {
                self.topics
                    .remove_if(&topic.channel, |_, slot| Arc::ptr_eq(slot, &topic.slot));
            }
        }
    }
}

fn occurrences(channels: &[PubSubChannel], channel: &PubSubChannel) -> usize {
    channels.iter().filter(|c| *c == channel).count()
}
