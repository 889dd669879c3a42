//! JoinRoom (op 2), LeaveRoom (op 3) and RoomJoinRequest (op 4)

use super::{
    decode, encode, membership, permitted, player, ErrorCode, HandlerError, HandlerResult, PacketHandler,
};
use crate::broadcast::Message;
use crate::connection::Connection;
use crate::protocol::{JoinRoomResponse, Notification, NotificationKind, OpCode, Packet};
use crate::server::GatewayState;
use async_trait::async_trait;
use std::sync::Arc;
use watch_cache::keys::{self, fields, join_request};
use watch_cache::WriteBatch;
use watch_core::{Permissions, RoleSet, RoomId, UserId};

/// Put a connection into a room
///
/// Store membership is committed before the session and the local room are
/// marked, so an interrupted join is always visible to the disconnect cleanup.
pub async fn join_room(state: &GatewayState, conn: &Arc<Connection>, room_id: RoomId) -> HandlerResult<()> {
    enter_room(state, conn, room_id, false).await
}

/// Put a reclaimed session back into the room it was admitted to
pub async fn rejoin_room(state: &GatewayState, conn: &Arc<Connection>, room_id: RoomId) -> HandlerResult<()> {
    enter_room(state, conn, room_id, true).await
}

async fn enter_room(state: &GatewayState, conn: &Arc<Connection>, room_id: RoomId, admitted: bool) -> HandlerResult<()> {
    let Some(room) = state.repositories().rooms.find_by_id(room_id).await? else {
        tracing::debug!(session_id = %conn.session_id(), room_id = %room_id, "Join for unknown room");
        return Ok(());
    };

    let session = conn.session();
    let current = session.room_id();
    let already_in_room = current == room_id;
    if !current.is_zero() && !already_in_room {
        membership::remove_client(state, conn, true)
            .await
            .map_err(|err| err.with_code(ErrorCode::RemoveClient))?;
    }

    let user_id = session.user_id();
    let users_key = keys::room_users(room_id);
    let was_member = state.store().sismember(&users_key, &user_id.to_string()).await?;

    if room.private && !admitted && !already_in_room && !was_member && !room.is_owner(user_id) {
        let requests_key = keys::room_join_requests(room_id);
        let field = user_id.to_string();
        match state.store().hget(&requests_key, &field).await?.as_deref() {
            Some(join_request::ACCEPTED) => {
                state.store().hdel(&requests_key, &field).await?;
            }
            None => return request_join(state, room_id, user_id).await,
            Some(_) => return Ok(()),
        }
    }

    let session_id = session.id().to_string();
    let batch = WriteBatch::new()
        .sadd(users_key.clone(), user_id.to_string())
        .sadd(keys::room_user_sessions(room_id, user_id), session_id.clone())
        .hset(keys::session(&session_id), fields::ROOM_ID, room_id.to_string());
    state.store().apply(batch).await?;

    let mut user_ids = vec![user_id];
    user_ids.extend(
        state
            .store()
            .smembers(&users_key)
            .await?
            .iter()
            .filter_map(|id| UserId::parse(id).ok())
            .filter(|id| *id != user_id),
    );
    let members = state.repositories().users.find_room_members(&user_ids, room_id).await?;
    let me = members.iter().find(|member| member.user.id == user_id);
    let roles: RoleSet = me
        .map(|member| member.roles.iter().copied().collect())
        .unwrap_or_default();

    session.enter_room(room_id, roles.clone());
    state
        .rooms()
        .join(room_id, conn)
        .await
        .map_err(|err| HandlerError::gateway(ErrorCode::AddClient, err))?;

    if let Some(me) = me.filter(|_| !was_member) {
        state
            .dispatcher()
            .dispatch_room(room_id, Message::new(encode(OpCode::AddUser, me)?).ignoring(session_id.clone()))
            .await?;
    }

    let response = JoinRoomResponse {
        status: 200,
        room,
        members,
        permissions: roles.permissions(),
    };
    conn.send(encode(OpCode::JoinRoom, &response)?).await?;

    tracing::info!(session_id = %session_id, user_id = %user_id, room_id = %room_id, "Joined room");

    let current_item = state.store().hget_all(&keys::room_current_item(room_id)).await?;
    if let Some(item) = player::item_from_hash(&current_item)? {
        conn.send(encode(OpCode::VideoSet, &item)?).await?;
        let playback = player::get_state(state, room_id)
            .await
            .map_err(|err| err.with_code(ErrorCode::SendState))?;
        conn.send(encode(OpCode::PlayerState, &playback)?)
            .await
            .map_err(|err| HandlerError::gateway(ErrorCode::SendState, err))?;
    }

    Ok(())
}

/// Record a pending request and notify the room's managers
async fn request_join(state: &GatewayState, room_id: RoomId, user_id: UserId) -> HandlerResult<()> {
    let Some(user) = state.repositories().users.find_by_id(user_id).await? else {
        return Ok(());
    };

    state
        .store()
        .hset(
            &keys::room_join_requests(room_id),
            &[(user_id.to_string().as_str(), join_request::PENDING.to_string())],
        )
        .await?;

    let notification = Notification {
        id: uuid::Uuid::new_v4().to_string(),
        kind: NotificationKind::JoinRequest,
        data: serde_json::to_value(&user).map_err(|err| HandlerError::gateway(ErrorCode::Serialize, err))?,
    };
    let message = Message::new(encode(OpCode::AddNotification, &notification)?).requiring(Permissions::MANAGE_ROOM);
    state.dispatcher().dispatch_room(room_id, message).await?;

    tracing::debug!(user_id = %user_id, room_id = %room_id, "Join request sent");
    Ok(())
}

/// Handles JoinRoom packets
pub struct JoinRoomHandler;

#[async_trait]
impl PacketHandler for JoinRoomHandler {
    async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, packet: &Packet) -> HandlerResult<()> {
        let room_id: RoomId = decode(packet)?;
        if room_id.is_zero() {
            return Ok(());
        }
        join_room(state, conn, room_id).await
    }
}

/// Handles LeaveRoom packets
pub struct LeaveRoomHandler;

#[async_trait]
impl PacketHandler for LeaveRoomHandler {
    async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, _packet: &Packet) -> HandlerResult<()> {
        membership::remove_client(state, conn, true)
            .await
            .map_err(|err| err.with_code(ErrorCode::RemoveClient))
    }
}

/// Handles RoomJoinRequest packets: a manager accepting a pending request
pub struct RoomJoinRequestHandler;

#[async_trait]
impl PacketHandler for RoomJoinRequestHandler {
    async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, packet: &Packet) -> HandlerResult<()> {
        let session = conn.session();
        let room_id = session.room_id();
        if room_id.is_zero() || !permitted(&session, Permissions::MANAGE_ROOM, packet.op) {
            return Ok(());
        }

        let target: UserId = decode(packet)?;
        state
            .store()
            .hset(
                &keys::room_join_requests(room_id),
                &[(target.to_string().as_str(), join_request::ACCEPTED.to_string())],
            )
            .await?;

        let message = Message::new(encode(OpCode::RoomJoinRequest, &room_id)?).to_users([target]);
        state.dispatcher().dispatch(message).await?;

        tracing::debug!(user_id = %session.user_id(), target_user_id = %target, room_id = %room_id, "Join request accepted");
        Ok(())
    }
}
