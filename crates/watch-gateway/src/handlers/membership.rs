//! Leaving rooms and KickUser (op 12)

use super::{decode, encode, permitted, HandlerResult, PacketHandler, ServerHandler};
use crate::broadcast::Message;
use crate::connection::Connection;
use crate::protocol::{OpCode, Packet};
use crate::server::GatewayState;
use async_trait::async_trait;
use std::sync::Arc;
use watch_cache::keys::{self, fields};
use watch_cache::WriteBatch;
use watch_core::{Permissions, RoleSet, RoomId, UserId};

/// Take a connection out of its current room
///
/// The local room is left and the session unmarked before the store writes, so a
/// failed write is repaired by the disconnect reconciliation. `update_session`
/// also clears the stored room id; a disconnect keeps it so a reclaimed session
/// can rejoin.
pub async fn remove_client(state: &GatewayState, conn: &Connection, update_session: bool) -> HandlerResult<()> {
    let session = conn.session();
    let room_id = session.room_id();
    if room_id.is_zero() {
        return Ok(());
    }
    let user_id = session.user_id();

    if let Err(err) = state.rooms().leave(room_id, conn).await {
        tracing::error!(session_id = %session.id(), room_id = %room_id, error = %err, "Failed to release room topic");
    }
    session.leave_room();

    let mut batch = WriteBatch::new().srem(keys::room_user_sessions(room_id, user_id), session.id());
    if update_session {
        batch = batch.hset(keys::session(session.id()), fields::ROOM_ID, RoomId::NONE.to_string());
    }
    state.store().apply(batch).await?;

    tracing::debug!(session_id = %session.id(), room_id = %room_id, "Client left room");
    release_membership(state, room_id, user_id).await
}

/// Drop a user from the room once their last session there is gone
///
/// The emptiness check and the removal are one store operation, so a session of
/// the same user joining concurrently keeps the user in the room.
pub(crate) async fn release_membership(state: &GatewayState, room_id: RoomId, user_id: UserId) -> HandlerResult<()> {
    let removed = state
        .store()
        .srem_unless_guarded(
            &keys::room_users(room_id),
            &user_id.to_string(),
            &keys::room_user_sessions(room_id, user_id),
        )
        .await?;

    // Only the caller that actually removed the user announces it
    if removed {
        state
            .dispatcher()
            .dispatch_room(room_id, Message::new(encode(OpCode::RemoveUser, &user_id)?))
            .await?;
    }
    Ok(())
}

/// Handles KickUser packets
pub struct KickUserHandler;

#[async_trait]
impl PacketHandler for KickUserHandler {
    async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, packet: &Packet) -> HandlerResult<()> {
        let session = conn.session();
        let room_id = session.room_id();
        if room_id.is_zero() || !permitted(&session, Permissions::KICK_MEMBERS, packet.op) {
            return Ok(());
        }

        let target: UserId = decode(packet)?;
        if target == session.user_id() {
            return Ok(());
        }

        let users_key = keys::room_users(room_id);
        if !state.store().sismember(&users_key, &target.to_string()).await? {
            return Ok(());
        }

        let target_roles: RoleSet = state
            .repositories()
            .roles
            .find_user_roles(target, room_id)
            .await?
            .into_iter()
            .collect();
        if session.roles().max_order() <= target_roles.max_order() {
            tracing::warn!(
                user_id = %session.user_id(),
                target_user_id = %target,
                room_id = %room_id,
                "Tried to kick a user with an equal or higher authority"
            );
            return Ok(());
        }

        let sessions_key = keys::room_user_sessions(room_id, target);
        let sessions = state.store().smembers(&sessions_key).await?;

        // Resolved through the session sets, so it must go out before they are cleared
        let kick = Message::server(encode(OpCode::KickUser, &target)?)
            .to_users([target])
            .in_room(room_id);
        state.dispatcher().dispatch(kick).await?;

        let batch = sessions.iter().fold(
            WriteBatch::new()
                .srem(users_key, target.to_string())
                .del(sessions_key),
            |batch, session_id| batch.hset(keys::session(session_id), fields::ROOM_ID, RoomId::NONE.to_string()),
        );
        state.store().apply(batch).await?;

        state
            .dispatcher()
            .dispatch_room(room_id, Message::new(encode(OpCode::RemoveUser, &target)?))
            .await?;

        tracing::info!(user_id = %session.user_id(), target_user_id = %target, room_id = %room_id, "User kicked");
        Ok(())
    }
}

/// Handles KickUser server messages
///
/// Every local session of the kicked user in that room leaves it and is told so.
pub struct KickHandler;

#[async_trait]
impl ServerHandler for KickHandler {
    async fn handle(&self, state: &GatewayState, message: &Message) -> HandlerResult<()> {
        let user_id: UserId = decode(&message.data)?;
        let Some(room_id) = message.target.room_id else {
            return Ok(());
        };

        for session in state.sessions().by_user(user_id) {
            if !message.target.accepts(&session) {
                continue;
            }
            let Some(conn) = state.clients().get(session.id()) else {
                continue;
            };

            if let Err(err) = state.rooms().leave(room_id, &conn).await {
                tracing::error!(session_id = %session.id(), room_id = %room_id, error = %err, "Failed to kick user from room");
            }
            session.leave_room();

            if let Err(err) = conn.send(Packet::empty(OpCode::KickUser)).await {
                tracing::error!(session_id = %session.id(), error = %err, "Failed to send kick message");
            }
        }
        Ok(())
    }
}
