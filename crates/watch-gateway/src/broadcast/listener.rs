//! Pub/sub ingestion loop
//!
//! One long-lived task per node. Messages on room channels go to the local room,
//! everything else (node, broadcast, user and session channels) is delivered like
//! a local dispatch. Server messages end up in the server inbox either way.
//! Falling behind the transport drops messages, so `on_lag` is told how many were
//! missed and can bring local sockets back in line.

use super::{Dispatcher, Message};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use watch_cache::{PubSubChannel, ReceivedMessage};

/// Run until `cancel` fires or the transport closes
pub async fn run<F>(
    dispatcher: Arc<Dispatcher>,
    mut receiver: broadcast::Receiver<ReceivedMessage>,
    cancel: CancellationToken,
    on_lag: F,
) where
    F: Fn(u64) + Send + 'static,
{
    tracing::info!(node_id = %dispatcher.node_id(), "Pub/sub listener started");

    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => break,
            received = receiver.recv() => received,
        };

        match received {
            Ok(msg) => handle_message(&dispatcher, &msg),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::error!(
                    node_id = %dispatcher.node_id(),
                    missed,
                    "Pub/sub listener fell behind, messages were dropped"
                );
                on_lag(missed);
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::warn!("Pub/sub listener channel closed");
                break;
            }
        }
    }

    tracing::info!("Pub/sub listener loop ended");
}

/// Route one received payload
pub fn handle_message(dispatcher: &Dispatcher, received: &ReceivedMessage) {
    let message = match Message::decode(&received.payload) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(channel = %received.channel, error = %e, "Dropping undecodable message");
            return;
        }
    };

    // Already delivered locally before it was published
    if message.origin == dispatcher.node_id() {
        tracing::trace!(channel = %received.channel, op = %message.op(), "Skipping own message");
        return;
    }

    tracing::trace!(
        channel = %received.channel,
        origin = %message.origin,
        op = %message.op(),
        "Received message"
    );

    match &received.channel {
        PubSubChannel::Room(room_id) => dispatcher.deliver_room_local(*room_id, &message),
        _ => dispatcher.deliver_local(&message),
    }
}
