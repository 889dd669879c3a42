//! The dedicated Redis subscribe connection
//!
//! A background task owns the connection and the set of active topics. Topic
//! changes reach it over a command channel, received messages leave through a
//! broadcast channel, and after a reconnect every active topic is subscribed again.

use crate::pubsub::{PubSubChannel, PubSubError, PubSubResult, ReceivedMessage};
use futures_util::StreamExt;
use redis::aio::PubSub;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Received messages buffered for the node's listener
    pub broadcast_buffer: usize,
    /// Pause before dialing again after the connection drops
    pub reconnect_delay: Duration,
}

impl SubscriberConfig {
    #[must_use]
    pub fn new(broadcast_buffer: usize) -> Self {
        Self {
            broadcast_buffer: broadcast_buffer.max(1),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

type Ack = oneshot::Sender<Result<(), String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Subscribe,
    Unsubscribe,
}

enum Command {
    Change(Change, Vec<String>, Ack),
    Shutdown,
}

/// How a connection's session ended
enum Exit {
    Shutdown,
    Dropped,
}

/// Handle to the subscribe task
pub struct Subscriber {
    messages: broadcast::Sender<ReceivedMessage>,
    commands: mpsc::Sender<Command>,
}

impl Subscriber {
    /// Start the subscribe task against `redis_url`
    #[must_use]
    pub fn spawn(redis_url: impl Into<String>, config: SubscriberConfig) -> Self {
        let (messages, _) = broadcast::channel(config.broadcast_buffer.max(1));
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);

        tokio::spawn(run(redis_url.into(), config.reconnect_delay, messages.clone(), command_rx));

        Self { messages, commands }
    }

    async fn request(&self, change: Change, channels: &[PubSubChannel]) -> PubSubResult<()> {
        if channels.is_empty() {
            return Ok(());
        }
        let names = channels.iter().map(PubSubChannel::name).collect();
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command::Change(change, names, ack))
            .await
            .map_err(|_| PubSubError::ChannelClosed)?;

        done.await
            .map_err(|_| PubSubError::ChannelClosed)?
            .map_err(PubSubError::Connection)
    }

    /// Subscribe, returning once Redis confirmed
    pub async fn subscribe(&self, channels: &[PubSubChannel]) -> PubSubResult<()> {
        self.request(Change::Subscribe, channels).await
    }

    pub async fn unsubscribe(&self, channels: &[PubSubChannel]) -> PubSubResult<()> {
        self.request(Change::Unsubscribe, channels).await
    }

    #[must_use]
    pub fn receiver(&self) -> broadcast::Receiver<ReceivedMessage> {
        self.messages.subscribe()
    }

    pub async fn shutdown(&self) -> PubSubResult<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| PubSubError::ChannelClosed)
    }
}

async fn run(
    redis_url: String,
    reconnect_delay: Duration,
    messages: broadcast::Sender<ReceivedMessage>,
    mut commands: mpsc::Receiver<Command>,
) {
    let mut topics = HashSet::new();
    loop {
        match connect(&redis_url, &topics).await {
            Ok(pubsub) => match serve(pubsub, &mut topics, &messages, &mut commands).await {
                Exit::Shutdown => {
                    tracing::info!("Subscriber shutting down");
                    return;
                }
                Exit::Dropped => tracing::warn!(topics = topics.len(), "Subscribe connection dropped"),
            },
            Err(err) => tracing::error!(error = %err, "Failed to open subscribe connection"),
        }
        tokio::time::sleep(reconnect_delay).await;
    }
}

async fn connect(redis_url: &str, topics: &HashSet<String>) -> PubSubResult<PubSub> {
    let mut pubsub = redis::Client::open(redis_url)?.get_async_pubsub().await?;
    if !topics.is_empty() {
        pubsub.subscribe(topics.iter().collect::<Vec<_>>()).await?;
    }
    tracing::info!(topics = topics.len(), "Subscriber connected to Redis");
    Ok(pubsub)
}

async fn serve(
    mut pubsub: PubSub,
    topics: &mut HashSet<String>,
    messages: &broadcast::Sender<ReceivedMessage>,
    commands: &mut mpsc::Receiver<Command>,
) -> Exit {
    loop {
        // The message stream borrows the connection, so it is rebuilt after each change
        let command = {
            let mut stream = pubsub.on_message();
            loop {
                tokio::select! {
                    msg = stream.next() => {
                        let Some(msg) = msg else { return Exit::Dropped };
                        let channel = msg.get_channel_name().to_string();
                        match msg.get_payload::<Vec<u8>>() {
                            // No receivers is not an error
                            Ok(payload) => {
                                let _ = messages.send(ReceivedMessage::from_redis(&channel, payload));
                            }
                            Err(err) => tracing::warn!(channel = %channel, error = %err, "Unreadable Pub/Sub payload"),
                        }
                    }
                    command = commands.recv() => break command,
                }
            }
        };

        let Some(Command::Change(change, channels, ack)) = command else {
            return Exit::Shutdown;
        };
        let result = match change {
            Change::Subscribe => pubsub.subscribe(&channels).await,
            Change::Unsubscribe => pubsub.unsubscribe(&channels).await,
        };
        let reply = match result {
            Ok(()) => {
                apply(topics, change, channels);
                Ok(())
            }
            Err(err) => {
                tracing::error!(?change, error = %err, "Failed to change subscriptions");
                Err(err.to_string())
            }
        };
        if ack.send(reply).is_err() {
            tracing::debug!(?change, "Subscription change abandoned by caller");
        }
    }
}

/// Record a confirmed change in the topics replayed after a reconnect
fn apply(topics: &mut HashSet<String>, change: Change, channels: Vec<String>) {
    match change {
        Change::Subscribe => topics.extend(channels),
        Change::Unsubscribe => {
            for channel in &channels {
                topics.remove(channel);
            }
        }
    }
}
