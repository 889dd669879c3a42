//! Op code handlers
//!
//! Business logic for client packets and fleet-internal server messages. Handlers
//! mutate session and room state, write the shared store, and call the dispatcher.

mod auth;
mod error;
mod manager;
mod membership;
mod player;
mod queue;
mod roles;
mod room;

pub use auth::{AuthHandler, DisconnectHandler, SessionTakeoverHandler};
pub use error::{ErrorCode, HandlerError, HandlerResult};
pub use manager::{HandlerManager, PacketHandler, ServerHandler};
pub use membership::{remove_client, KickHandler, KickUserHandler};
pub use player::{
    get_state, next_item, resync_local_rooms, set_current_item, PlayerStateHandler, SeekHandler,
    VideoEndHandler, VideoSkipHandler,
};
pub use queue::{normalize_url, QueueAddHandler, QueueRemoveHandler};
pub use roles::{RoleChangeHandler, UpdateRoleHandler};
pub use room::{join_room, JoinRoomHandler, LeaveRoomHandler, RoomJoinRequestHandler};

use crate::connection::Session;
use crate::protocol::{OpCode, Packet};
use serde::de::DeserializeOwned;
use serde::Serialize;
use watch_core::Permissions;

/// Register every built-in handler
pub(crate) fn register_defaults(manager: &mut HandlerManager) {
    manager
        .register_handler(OpCode::Authenticate, AuthHandler)
        .register_handler(OpCode::Disconnect, DisconnectHandler)
        .register_handler(OpCode::JoinRoom, JoinRoomHandler)
        .register_handler(OpCode::LeaveRoom, LeaveRoomHandler)
        .register_handler(OpCode::RoomJoinRequest, RoomJoinRequestHandler)
        .register_handler(OpCode::KickUser, KickUserHandler)
        .register_handler(OpCode::AddRole, UpdateRoleHandler)
        .register_handler(OpCode::RemoveRole, UpdateRoleHandler)
        .register_handler(OpCode::QueueAdd, QueueAddHandler)
        .register_handler(OpCode::QueueRemove, QueueRemoveHandler)
        .register_handler(OpCode::PlayerState, PlayerStateHandler)
        .register_handler(OpCode::Seek, SeekHandler)
        .register_handler(OpCode::VideoSkip, VideoSkipHandler)
        .register_handler(OpCode::VideoEnd, VideoEndHandler);

    manager
        .register_server_handler(OpCode::SessionTakeover, SessionTakeoverHandler)
        .register_server_handler(OpCode::KickUser, KickHandler)
        .register_server_handler(OpCode::AddRole, RoleChangeHandler)
        .register_server_handler(OpCode::RemoveRole, RoleChangeHandler);
}

/// Build an outbound packet
pub(crate) fn encode<T: Serialize>(op: OpCode, data: &T) -> HandlerResult<Packet> {
    Packet::with_data(op, data).map_err(|err| HandlerError::gateway(ErrorCode::Serialize, err))
}

/// Read the typed payload of an inbound packet
pub(crate) fn decode<T: DeserializeOwned>(packet: &Packet) -> HandlerResult<T> {
    packet.data().map_err(HandlerError::InvalidPayload)
}

/// Check a room permission, logging denials
///
/// Denials are silent for the client.
pub(crate) fn permitted(session: &Session, permission: Permissions, op: OpCode) -> bool {
    if session.has_permission(permission) {
        return true;
    }

    tracing::warn!(
        session_id = %session.id(),
        user_id = %session.user_id(),
        room_id = %session.room_id(),
        op = %op,
        "Permission denied"
    );
    false
}
