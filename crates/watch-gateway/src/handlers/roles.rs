//! AddRole (op 13) and RemoveRole (op 14)

use super::{decode, encode, permitted, HandlerResult, PacketHandler, ServerHandler};
use crate::broadcast::Message;
use crate::connection::Connection;
use crate::protocol::{OpCode, Packet, RoleUpdatePayload};
use crate::server::GatewayState;
use async_trait::async_trait;
use std::sync::Arc;
use watch_cache::keys;
use watch_core::{Permissions, RoleSet, UserRole};

/// Handles AddRole and RemoveRole packets
///
/// An actor can only grant or revoke roles strictly below their own, and can only
/// revoke from users ranked strictly below them.
pub struct UpdateRoleHandler;

#[async_trait]
impl PacketHandler for UpdateRoleHandler {
    async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, packet: &Packet) -> HandlerResult<()> {
        let session = conn.session();
        let room_id = session.room_id();
        if room_id.is_zero() || !permitted(&session, Permissions::MANAGE_ROLES, packet.op) {
            return Ok(());
        }

        let update: RoleUpdatePayload = decode(packet)?;
        if update.user_id == session.user_id() {
            return Ok(());
        }
        let Some(role) = update.role_id.role() else {
            return Ok(());
        };

        let actor_order = session.roles().max_order();
        if role.order >= actor_order {
            tracing::warn!(
                user_id = %session.user_id(),
                role = role.name,
                room_id = %room_id,
                "Tried to manage a role at or above their own"
            );
            return Ok(());
        }

        let in_room = state
            .store()
            .sismember(&keys::room_users(room_id), &update.user_id.to_string())
            .await?;
        if !in_room {
            return Ok(());
        }

        let roles = &state.repositories().roles;
        if packet.op == OpCode::RemoveRole {
            let target_roles: RoleSet = roles.find_user_roles(update.user_id, room_id).await?.into_iter().collect();
            if actor_order <= target_roles.max_order() {
                tracing::warn!(
                    user_id = %session.user_id(),
                    target_user_id = %update.user_id,
                    room_id = %room_id,
                    "Tried to remove a role from a user with an equal or higher authority"
                );
                return Ok(());
            }
        }

        let user_role = UserRole {
            user_id: update.user_id,
            room_id,
            role_id: role.id,
        };
        if packet.op == OpCode::AddRole {
            roles.add(&user_role).await?;
        } else {
            roles.remove(&user_role).await?;
        }

        let echo = encode(packet.op, &update)?;
        state
            .dispatcher()
            .dispatch(
                Message::server(echo.clone())
                    .to_users([update.user_id])
                    .in_room(room_id),
            )
            .await?;
        state
            .dispatcher()
            .dispatch_room(room_id, Message::new(echo).ignoring(session.id()))
            .await?;

        tracing::info!(
            user_id = %session.user_id(),
            target_user_id = %update.user_id,
            role = role.name,
            op = %packet.op,
            "Role updated"
        );
        Ok(())
    }
}

/// Applies a role change to the target's local sessions
pub struct RoleChangeHandler;

#[async_trait]
impl ServerHandler for RoleChangeHandler {
    async fn handle(&self, state: &GatewayState, message: &Message) -> HandlerResult<()> {
        let update: RoleUpdatePayload = decode(&message.data)?;

        for session in state.sessions().by_user(update.user_id) {
            if !message.target.accepts(&session) {
                continue;
            }

            if message.op() == OpCode::AddRole {
                session.add_role(update.role_id);
            } else {
                session.remove_role(update.role_id);
            }

            let Some(conn) = state.clients().get(session.id()) else {
                continue;
            };
            let packet = encode(OpCode::UpdatePermissions, &session.permissions())?;
            if let Err(err) = conn.send(packet).await {
                tracing::error!(session_id = %session.id(), error = %err, "Failed to send permission update");
            }
        }
        Ok(())
    }
}
