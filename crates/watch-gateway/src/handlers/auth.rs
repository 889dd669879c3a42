//! Authenticate (op 0), Disconnect (op 1) and session takeover handling

use super::{decode, encode, membership, room, HandlerError, HandlerResult, PacketHandler, ServerHandler};
use crate::broadcast::Message;
use crate::connection::{Connection, Session, SessionRecord};
use crate::protocol::{AuthenticatePayload, AuthenticatedPayload, OpCode, Packet, SessionTakeoverPayload};
use crate::server::GatewayState;
use async_trait::async_trait;
use std::sync::Arc;
use watch_cache::keys::{self, fields};
use watch_cache::{PubSubChannel, WriteBatch};
use watch_core::{RoomId, UserId};

fn topics(session: &Session) -> [PubSubChannel; 2] {
    [
        PubSubChannel::user(session.user_id()),
        PubSubChannel::session(session.id()),
    ]
}

/// Handles Authenticate packets
///
/// A client either gets a fresh session or reclaims a previous one by id. A
/// reclaimed session that was in a room rejoins it.
pub struct AuthHandler;

#[async_trait]
impl PacketHandler for AuthHandler {
    async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, packet: &Packet) -> HandlerResult<()> {
        if conn.session().is_authenticated() {
            tracing::debug!(session_id = %conn.session_id(), "Already authenticated");
            return Ok(());
        }

        let payload: AuthenticatePayload = decode(packet)
            .map_err(|_| HandlerError::Auth("malformed authenticate payload".to_string()))?;
        let token = payload.token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token);
        if token.is_empty() {
            return Err(HandlerError::Auth("missing token".to_string()));
        }

        let user_id = state
            .verifier()
            .verify(token)
            .map_err(|err| HandlerError::Auth(err.to_string()))?;
        let user = state
            .repositories()
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| HandlerError::Auth(format!("unknown user {user_id}")))?;

        let reclaimed = match payload.session_id.as_deref().filter(|id| !id.is_empty()) {
            Some(session_id) => reclaim(state, conn, session_id, user.id).await?,
            None => None,
        };

        let (session, batch, stored_room) = match reclaimed {
            Some(reclaimed) => reclaimed,
            None => {
                let session = conn.session();
                session.set_user_id(user.id);
                session.set_node_id(state.node_id());
                let batch = WriteBatch::new().hset_many(keys::session(session.id()), session.record_fields());
                (session, batch, RoomId::NONE)
            }
        };

        state.sessions().add(session.clone());
        let batch = batch.sadd(keys::user_sessions(user.id), session.id());
        state.store().apply(batch).await?;

        state
            .subscriptions()
            .add_many(&topics(&session))
            .await
            .map_err(|err| HandlerError::Auth(format!("failed to subscribe session topics: {err}")))?;

        conn.send(encode(
            OpCode::Authenticate,
            &AuthenticatedPayload {
                session_id: session.id().to_string(),
            },
        )?)
        .await?;

        tracing::info!(
            session_id = %session.id(),
            user_id = %user.id,
            username = %user.username,
            "Client authenticated"
        );

        if !stored_room.is_zero() {
            room::rejoin_room(state, conn, stored_room).await?;
        }

        Ok(())
    }
}

/// Move `conn` onto a stored session
///
/// Returns the session, the store writes that reclaim it and the room it should
/// rejoin, or `None` when the record is gone so the caller falls back to a fresh
/// session. A record owned by another user is a hijack attempt.
async fn reclaim(
    state: &GatewayState,
    conn: &Arc<Connection>,
    session_id: &str,
    user_id: UserId,
) -> HandlerResult<Option<(Arc<Session>, WriteBatch, RoomId)>> {
    let key = keys::session(session_id);
    let hash = state.store().hget_all(&key).await?;
    let Some(record) = SessionRecord::from_hash(&hash) else {
        tracing::debug!(session_id = %session_id, "Session expired, starting a new one");
        return Ok(None);
    };

    if record.user_id != user_id {
        return Err(HandlerError::Auth(format!(
            "session hijack attempted: session owner {} - target user {user_id}",
            record.user_id
        )));
    }

    // Sockets on other nodes still holding this session
    let takeover = encode(
        OpCode::SessionTakeover,
        &SessionTakeoverPayload {
            session_id: session_id.to_string(),
            connection_id: conn.id(),
        },
    )?;
    state
        .dispatcher()
        .publish_to(&PubSubChannel::session(session_id), Message::server(takeover))
        .await?;

    let session = Session::restore(session_id, &record, state.node_id());
    if let Some(stale) = state.clients().update_session(conn, session.clone()) {
        evict(&stale);
    }

    let mut batch = WriteBatch::new().persist(key.clone());
    if record.node_id != state.node_id() {
        batch = batch.hset(key, fields::NODE_ID, state.node_id());
    }

    tracing::info!(session_id = %session_id, user_id = %user_id, room_id = %record.room_id, "Session reclaimed");
    Ok(Some((session, batch, record.room_id)))
}

fn evict(stale: &Connection) {
    tracing::info!(session_id = %stale.session_id(), connection_id = %stale.id(), "Evicting stale connection");
    stale.mark_superseded();
    stale.disconnect();
}

/// Handles SessionTakeover server messages
///
/// Closes the local socket for a session that another socket reclaimed.
pub struct SessionTakeoverHandler;

#[async_trait]
impl ServerHandler for SessionTakeoverHandler {
    async fn handle(&self, state: &GatewayState, message: &Message) -> HandlerResult<()> {
        let payload: SessionTakeoverPayload = decode(&message.data)?;
        if let Some(stale) = state.clients().get(&payload.session_id) {
            if stale.id() != payload.connection_id {
                evict(&stale);
            }
        }
        Ok(())
    }
}

/// Cleans up after a closed socket
///
/// Runs once per connection, after its packet handler task has stopped. Failures
/// are logged; the socket is already gone.
pub struct DisconnectHandler;

#[async_trait]
impl PacketHandler for DisconnectHandler {
    async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, _packet: &Packet) -> HandlerResult<()> {
        state.clients().remove(conn);

        let session = conn.session();
        if !session.is_authenticated() {
            return Ok(());
        }
        state.sessions().remove(&session);

        if conn.is_superseded() || reclaimed_elsewhere(state, &session).await {
            release_local(state, conn, &session).await;
            return Ok(());
        }

        let room_id = session.room_id();
        if let Err(err) = membership::remove_client(state, conn, false).await {
            tracing::error!(session_id = %session.id(), room_id = %room_id, error = %err, "Failed to remove client from room");
        }
        if room_id.is_zero() {
            reconcile_room(state, &session).await;
        }

        let batch = WriteBatch::new()
            .srem(keys::user_sessions(session.user_id()), session.id())
            .expire(keys::session(session.id()), state.session_config().ttl());
        if let Err(err) = state.store().apply(batch).await {
            tracing::error!(session_id = %session.id(), error = %err, "Failed to destroy session");
        }

        if let Err(err) = state.subscriptions().remove_many(&topics(&session)).await {
            tracing::error!(session_id = %session.id(), error = %err, "Failed to release session topics");
        }

        tracing::debug!(session_id = %session.id(), user_id = %session.user_id(), "Client disconnected");
        Ok(())
    }
}

/// Whether another node now owns the stored session record
async fn reclaimed_elsewhere(state: &GatewayState, session: &Session) -> bool {
    match state.store().hget(&keys::session(session.id()), fields::NODE_ID).await {
        Ok(Some(node_id)) => node_id != state.node_id(),
        Ok(None) => false,
        Err(err) => {
            tracing::warn!(session_id = %session.id(), error = %err, "Failed to read session owner");
            false
        }
    }
}

/// Drop a superseded connection's local state, leaving the store to the live session
async fn release_local(state: &GatewayState, conn: &Connection, session: &Session) {
    let room_id = session.room_id();
    if !room_id.is_zero() {
        if let Err(err) = state.rooms().leave(room_id, conn).await {
            tracing::warn!(session_id = %session.id(), room_id = %room_id, error = %err, "Failed to leave local room");
        }
    }
    if let Err(err) = state.subscriptions().remove_many(&topics(session)).await {
        tracing::warn!(session_id = %session.id(), error = %err, "Failed to release session topics");
    }
    tracing::debug!(session_id = %session.id(), connection_id = %conn.id(), "Superseded connection closed");
}

/// Remove store membership left by a join that committed but never marked the session
async fn reconcile_room(state: &GatewayState, session: &Session) {
    let stored = match state.store().hget(&keys::session(session.id()), fields::ROOM_ID).await {
        Ok(value) => value.and_then(|v| RoomId::parse(&v).ok()).unwrap_or_default(),
        Err(err) => {
            tracing::warn!(session_id = %session.id(), error = %err, "Failed to read stored room");
            return;
        }
    };
    if stored.is_zero() {
        return;
    }

    let user_id = session.user_id();
    let result = async {
        let removed = state
            .store()
            .srem(&keys::room_user_sessions(stored, user_id), session.id())
            .await?;
        if removed {
            tracing::info!(session_id = %session.id(), room_id = %stored, "Reconciled interrupted room join");
            membership::release_membership(state, stored, user_id).await?;
        }
        HandlerResult::Ok(())
    }
    .await;

    if let Err(err) = result {
        tracing::error!(session_id = %session.id(), room_id = %stored, error = %err, "Failed to reconcile room membership");
    }
}
