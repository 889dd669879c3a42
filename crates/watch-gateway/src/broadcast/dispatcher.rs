//! Dispatcher
//!
//! Decides which sockets receive a message, on this node and on the rest of the
//! fleet.
//!
//! Targeted messages are resolved through the store: the target users' session sets
//! give session ids, and each session record names the node that owns it. Every
//! owning node gets the message once, either in-process (this node) or on its
//! private `gateway:{node}` channel. Room messages are delivered to the local room
//! and published once on `room:{id}`, which every node hosting that room listens to.

use super::{CodecError, Message, MessageKind};
use crate::connection::{ClientRegistry, Connection, SendError, SessionRegistry};
use crate::room::RoomRegistry;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use watch_cache::keys::{self, fields};
use watch_cache::{KeyValueStore, PubSubChannel, PubSubError, PubSubTransport, StoreError};
use watch_core::{RoomId, UserId};

/// Error type for dispatch operations
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    PubSub(#[from] PubSubError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Routes messages to local connections, other nodes, and server handlers
pub struct Dispatcher {
    node_id: String,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn PubSubTransport>,
    clients: Arc<ClientRegistry>,
    sessions: Arc<SessionRegistry>,
    rooms: Arc<RoomRegistry>,
    /// Server messages addressed to this node
    server_tx: mpsc::UnboundedSender<Message>,
}

impl Dispatcher {
    pub fn new(
        node_id: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn PubSubTransport>,
        clients: Arc<ClientRegistry>,
        sessions: Arc<SessionRegistry>,
        rooms: Arc<RoomRegistry>,
        server_tx: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            store,
            transport,
            clients,
            sessions,
            rooms,
            server_tx,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Deliver a message fleet-wide
    pub async fn dispatch(&self, mut message: Message) -> DispatchResult<()> {
        message.origin.clone_from(&self.node_id);

        if message.kind == MessageKind::Broadcast {
            self.deliver_local(&message);
            return self.publish(&PubSubChannel::broadcast(), &message).await;
        }

        let session_ids = self.resolve_sessions(&message).await?;
        let nodes = self.resolve_nodes(&session_ids).await?;

        let mut remote = Vec::new();
        let mut payload: Option<Vec<u8>> = None;
        for node_id in nodes {
            if node_id == self.node_id {
                self.deliver_local(&message);
                continue;
            }

            let bytes = match &payload {
                Some(bytes) => bytes.clone(),
                None => {
                    let bytes = message.encode()?;
                    payload = Some(bytes.clone());
                    bytes
                }
            };
            remote.push((PubSubChannel::node(node_id), bytes));
        }

        if !remote.is_empty() {
            tracing::trace!(
                op = %message.op(),
                nodes = remote.len(),
                "Publishing message to remote nodes"
            );
            self.transport.publish_many(&remote).await?;
        }

        Ok(())
    }

    /// Deliver a message to everyone in a room, fleet-wide
    pub async fn dispatch_room(&self, room_id: RoomId, mut message: Message) -> DispatchResult<()> {
        message.origin.clone_from(&self.node_id);
        message.target.room_id = Some(room_id);

        self.deliver_room_local(room_id, &message);
        self.publish(&PubSubChannel::room(room_id), &message).await
    }

    /// Publish a message on an arbitrary channel without local delivery
    pub async fn publish_to(&self, channel: &PubSubChannel, mut message: Message) -> DispatchResult<()> {
        message.origin.clone_from(&self.node_id);
        self.publish(channel, &message).await
    }

    async fn publish(&self, channel: &PubSubChannel, message: &Message) -> DispatchResult<()> {
        let payload = message.encode()?;
        self.transport.publish(channel, &payload).await?;
        Ok(())
    }

    /// Hand a message to local recipients: server handlers or sockets
    pub fn deliver_local(&self, message: &Message) {
        if message.kind == MessageKind::Server {
            self.enqueue_server(message);
        } else {
            self.dispatch_local(message);
        }
    }

    /// Room-scoped counterpart of [`Self::deliver_local`]
    pub fn deliver_room_local(&self, room_id: RoomId, message: &Message) {
        if message.kind == MessageKind::Server {
            if self.rooms.get(room_id).is_some() {
                self.enqueue_server(message);
            }
        } else {
            self.dispatch_room_local(room_id, message);
        }
    }

    fn enqueue_server(&self, message: &Message) {
        if self.server_tx.send(message.clone()).is_err() {
            tracing::warn!(op = %message.op(), "Server message inbox closed, dropping message");
        }
    }

    /// Write a message to every matching socket on this node
    ///
    /// Returns the number of sockets it was queued on.
    pub fn dispatch_local(&self, message: &Message) -> usize {
        let target = &message.target;

        let candidates: Vec<Arc<Connection>> = if !target.user_ids.is_empty() {
            target
                .user_ids
                .iter()
                .flat_map(|user_id| self.sessions.by_user(*user_id))
                .filter_map(|session| self.clients.get(session.id()))
                .collect()
        } else if let Some(room_id) = target.room_id {
            self.rooms.get(room_id).map(|room| room.members()).unwrap_or_default()
        } else {
            self.clients.all()
        };

        self.write_all(&candidates, message)
    }

    /// Write a room message to the matching members of the local room
    pub fn dispatch_room_local(&self, room_id: RoomId, message: &Message) -> usize {
        let Some(room) = self.rooms.get(room_id) else {
            return 0;
        };
        self.write_all(&room.members(), message)
    }

    fn write_all(&self, connections: &[Arc<Connection>], message: &Message) -> usize {
        let mut delivered = 0;
        for conn in connections {
            if !message.target.accepts(&conn.session()) {
                continue;
            }

            match conn.try_send(message.data.clone()) {
                Ok(()) => delivered += 1,
                Err(SendError::Closed) => {}
                Err(SendError::Full) => {
                    tracing::warn!(
                        connection_id = %conn.id(),
                        op = %message.op(),
                        "Outbound buffer full, dropping message"
                    );
                }
            }
        }
        delivered
    }

    /// Session ids the message is addressed to
    async fn resolve_sessions(&self, message: &Message) -> DispatchResult<Vec<String>> {
        let target = &message.target;

        let user_ids: Vec<UserId> = if target.user_ids.is_empty() {
            match target.room_id {
                Some(room_id) => self
                    .store
                    .smembers(&keys::room_users(room_id))
                    .await?
                    .iter()
                    .filter_map(|id| UserId::parse(id).ok())
                    .collect(),
                None => return Ok(Vec::new()),
            }
        } else {
            target.user_ids.clone()
        };

        let set_keys: Vec<String> = user_ids
            .into_iter()
            .map(|user_id| match target.room_id {
                Some(room_id) => keys::room_user_sessions(room_id, user_id),
                None => keys::user_sessions(user_id),
            })
            .collect();

        let members = self.store.smembers_many(&set_keys).await?;
        Ok(members.into_iter().flatten().collect())
    }

    /// Distinct owning nodes of the given sessions
    async fn resolve_nodes(&self, session_ids: &[String]) -> DispatchResult<BTreeSet<String>> {
        if session_ids.is_empty() {
            return Ok(BTreeSet::new());
        }

        let record_keys: Vec<String> = session_ids.iter().map(|id| keys::session(id)).collect();
        let nodes = self.store.hget_many(&record_keys, fields::NODE_ID).await?;

        Ok(nodes
            .into_iter()
            .flatten()
            .filter(|node_id| !node_id.is_empty())
            .collect())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("node_id", &self.node_id)
            .finish()
    }
}
