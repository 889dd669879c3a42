//! QueueAdd (op 5) and QueueRemove (op 6)

use super::{decode, encode, permitted, player, ErrorCode, HandlerError, HandlerResult, PacketHandler};
use crate::broadcast::Message;
use crate::connection::Connection;
use crate::protocol::{OpCode, Packet};
use crate::server::GatewayState;
use async_trait::async_trait;
use std::sync::Arc;
use watch_cache::keys;
use watch_cache::WriteBatch;
use watch_core::{MediaItem, MediaItemInfo, Permissions};

/// Rewrite YouTube watch links to their embeddable form
///
/// Anything else is returned trimmed but otherwise untouched.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let without_scheme = base
        .strip_prefix("https://")
        .or_else(|| base.strip_prefix("http://"))
        .unwrap_or(base);
    let (host, path) = without_scheme.split_once('/').unwrap_or((without_scheme, ""));
    let host = host.split(':').next().unwrap_or(host).to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').collect();
    let domain = labels[labels.len().saturating_sub(2)..].join(".");

    if domain != "youtube.com" || path.trim_end_matches('/') != "watch" {
        return url.to_string();
    }

    let query = query.split('#').next().unwrap_or(query);
    match query
        .split('&')
        .find_map(|pair| pair.strip_prefix("v="))
        .filter(|video| !video.is_empty())
    {
        Some(video) => format!("https://www.youtube.com/embed/{video}"),
        None => url.to_string(),
    }
}

/// Handles QueueAdd packets
///
/// The first item added to an idle room starts playing right away; later ones
/// are queued.
pub struct QueueAddHandler;

#[async_trait]
impl PacketHandler for QueueAddHandler {
    async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, packet: &Packet) -> HandlerResult<()> {
        let session = conn.session();
        let room_id = session.room_id();
        if room_id.is_zero() || !permitted(&session, Permissions::QUEUE_ADD, packet.op) {
            return Ok(());
        }

        let url: String = decode(packet)?;
        let url = url.trim();
        if url.is_empty() {
            return Ok(());
        }

        let info = state
            .media()
            .fetch(url)
            .await
            .map_err(|err| HandlerError::gateway(ErrorCode::Crawler, err))?;
        let item = MediaItem::new(
            uuid::Uuid::new_v4().to_string(),
            session.user_id(),
            MediaItemInfo {
                url: normalize_url(url),
                ..info
            },
        );

        let queue_key = keys::room_queue(room_id);
        let queued = state.store().llen(&queue_key).await?;
        let playing = state.store().exists(&keys::room_current_item(room_id)).await?;

        if queued == 0 && !playing {
            return player::set_current_item(state, room_id, Some(item))
                .await
                .map_err(|err| err.with_code(ErrorCode::SetCurrentItem));
        }

        let raw = serde_json::to_string(&item).map_err(|err| HandlerError::gateway(ErrorCode::Serialize, err))?;
        let batch = WriteBatch::new()
            .hset(keys::room_queue_items(room_id), item.id.clone(), raw)
            .rpush(queue_key, item.id.clone());
        state.store().apply(batch).await?;

        tracing::debug!(room_id = %room_id, item_id = %item.id, url = %item.url, "Item queued");
        state
            .dispatcher()
            .dispatch_room(room_id, Message::new(encode(OpCode::QueueAdd, &item)?))
            .await?;
        Ok(())
    }
}

/// Handles QueueRemove packets
///
/// Without `QUEUE_EDIT` a user can only remove items they added.
pub struct QueueRemoveHandler;

#[async_trait]
impl PacketHandler for QueueRemoveHandler {
    async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, packet: &Packet) -> HandlerResult<()> {
        let session = conn.session();
        let room_id = session.room_id();
        if room_id.is_zero() {
            return Ok(());
        }

        let item_id: String = decode(packet)?;
        let items_key = keys::room_queue_items(room_id);

        if !session.has_permission(Permissions::QUEUE_EDIT) {
            let Some(raw) = state.store().hget(&items_key, &item_id).await? else {
                return Ok(());
            };
            let item: MediaItem =
                serde_json::from_str(&raw).map_err(|err| HandlerError::gateway(ErrorCode::Parse, err))?;
            if item.author != session.user_id() {
                tracing::warn!(
                    user_id = %session.user_id(),
                    room_id = %room_id,
                    item_id = %item_id,
                    "Tried to remove a queue item without permission"
                );
                return Ok(());
            }
        }

        let removed = state.store().lrem(&keys::room_queue(room_id), 1, &item_id).await?;
        let forgotten = state.store().hdel(&items_key, &item_id).await?;
        if removed == 0 && !forgotten {
            return Ok(());
        }

        state
            .dispatcher()
            .dispatch_room(room_id, Message::new(encode(OpCode::QueueRemove, &item_id)?))
            .await?;
        Ok(())
    }
}
