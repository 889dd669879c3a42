//! Shared playback: PlayerState (op 7), Seek (op 8), VideoSkip (op 9), VideoEnd (op 10)
//!
//! The room's player state lives in `room:{id}:state` as the position at a
//! wall-clock start instant. Late joiners derive the live position from it.

use super::{decode, encode, permitted, ErrorCode, HandlerError, HandlerResult, PacketHandler};
use crate::broadcast::Message;
use crate::connection::Connection;
use crate::protocol::{OpCode, Packet, PlayerStatePayload};
use crate::server::GatewayState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use watch_cache::keys::{self, item_fields};
use watch_cache::{EndVote, WriteBatch};
use watch_core::{MediaItem, MediaItemType, Permissions, PlayerState, RoomId, UserId};

mod state_fields {
    pub const PLAYING: &str = "playing";
    pub const CURRENT_TIME: &str = "currentTime";
    pub const PLAYBACK_START: &str = "playbackStart";
}

fn parse_error(err: impl std::error::Error + Send + Sync + 'static) -> HandlerError {
    HandlerError::gateway(ErrorCode::Parse, err)
}

/// Read the `current_item` hash, `None` when nothing is playing
pub(crate) fn item_from_hash(hash: &HashMap<String, String>) -> HandlerResult<Option<MediaItem>> {
    let Some(id) = hash.get(item_fields::ID).filter(|id| !id.is_empty()) else {
        return Ok(None);
    };
    let field = |name: &str| hash.get(name).cloned().unwrap_or_default();

    let author = match hash.get(item_fields::AUTHOR).filter(|author| !author.is_empty()) {
        Some(author) => UserId::parse(author).map_err(parse_error)?,
        None => UserId::NONE,
    };
    let kind = hash
        .get(item_fields::TYPE)
        .and_then(|kind| kind.parse::<u8>().ok())
        .map(MediaItemType::from)
        .unwrap_or_default();

    Ok(Some(MediaItem {
        id: id.clone(),
        kind,
        author,
        url: field(item_fields::URL),
        title: field(item_fields::TITLE),
        icon: field(item_fields::ICON),
    }))
}

fn item_to_fields(item: &MediaItem) -> [(&'static str, String); 6] {
    [
        (item_fields::ID, item.id.clone()),
        (item_fields::TYPE, u8::from(item.kind).to_string()),
        (item_fields::URL, item.url.clone()),
        (item_fields::TITLE, item.title.clone()),
        (item_fields::ICON, item.icon.clone()),
        (item_fields::AUTHOR, item.author.to_string()),
    ]
}

fn state_to_fields(playback: &PlayerState) -> [(&'static str, String); 3] {
    [
        (state_fields::PLAYING, if playback.playing { "1" } else { "0" }.to_string()),
        (state_fields::CURRENT_TIME, playback.current_time.to_string()),
        (state_fields::PLAYBACK_START, playback.playback_start.to_rfc3339()),
    ]
}

fn state_from_hash(hash: &HashMap<String, String>, now: DateTime<Utc>) -> HandlerResult<PlayerState> {
    let playback_start = match hash.get(state_fields::PLAYBACK_START) {
        Some(start) => DateTime::parse_from_rfc3339(start)
            .map_err(parse_error)?
            .with_timezone(&Utc),
        None => now,
    };
    let current_time = match hash.get(state_fields::CURRENT_TIME) {
        Some(time) => time.parse::<f64>().map_err(parse_error)?,
        None => 0.0,
    };

    Ok(PlayerState {
        playing: hash.get(state_fields::PLAYING).is_some_and(|playing| playing == "1"),
        current_time,
        playback_start,
    })
}

/// The room's player state as of now
pub async fn get_state(state: &GatewayState, room_id: RoomId) -> HandlerResult<PlayerState> {
    let hash = state.store().hget_all(&keys::room_state(room_id)).await?;
    let now = Utc::now();
    Ok(state_from_hash(&hash, now)?.at(now))
}

/// Replace the playing item, or clear it with `None`
///
/// The room is told first, then the item, acks and player state are rewritten.
pub async fn set_current_item(state: &GatewayState, room_id: RoomId, item: Option<MediaItem>) -> HandlerResult<()> {
    let playback = PlayerState::reset(Utc::now());

    let dispatcher = state.dispatcher();
    dispatcher
        .dispatch_room(room_id, Message::new(encode(OpCode::VideoSet, &item)?))
        .await?;
    dispatcher
        .dispatch_room(room_id, Message::new(encode(OpCode::PlayerState, &playback)?))
        .await?;

    let current_key = keys::room_current_item(room_id);
    let mut batch = WriteBatch::new().del(current_key.clone());
    if let Some(item) = &item {
        batch = batch.hset_many(current_key, item_to_fields(item));
    }
    let batch = batch
        .del(keys::room_video_end_ack(room_id))
        .hset_many(keys::room_state(room_id), state_to_fields(&playback));
    state.store().apply(batch).await?;

    tracing::debug!(room_id = %room_id, item_id = item.as_ref().map(|item| item.id.as_str()), "Current item set");
    Ok(())
}

/// Advance the queue
///
/// With nothing queued and nothing playing this does nothing. With nothing queued
/// but something playing, the current item is cleared.
pub async fn next_item(state: &GatewayState, room_id: RoomId) -> HandlerResult<()> {
    let items_key = keys::room_queue_items(room_id);

    let item = match state.store().lpop(&keys::room_queue(room_id)).await? {
        Some(id) => {
            let raw = state.store().hget(&items_key, &id).await?;
            state.store().hdel(&items_key, &id).await?;
            state
                .dispatcher()
                .dispatch_room(room_id, Message::new(encode(OpCode::QueueRemove, &id)?))
                .await?;
            raw.map(|raw| serde_json::from_str::<MediaItem>(&raw))
                .transpose()
                .map_err(parse_error)?
        }
        None => {
            if !state.store().exists(&keys::room_current_item(room_id)).await? {
                return Ok(());
            }
            None
        }
    };

    set_current_item(state, room_id, item).await
}

/// Resend the playing item and player state to every room with local members
///
/// Run after this node missed pub/sub messages, so its sockets converge on the store.
pub async fn resync_local_rooms(state: &GatewayState) {
    let room_ids = state.rooms().room_ids();
    for room_id in &room_ids {
        if let Err(err) = resync_room(state, *room_id).await {
            tracing::warn!(room_id = %room_id, error = %err, "Failed to resync room");
        }
    }
    tracing::info!(rooms = room_ids.len(), "Local rooms resynced");
}

async fn resync_room(state: &GatewayState, room_id: RoomId) -> HandlerResult<()> {
    let hash = state.store().hget_all(&keys::room_current_item(room_id)).await?;
    let item = item_from_hash(&hash)?;
    let playback = get_state(state, room_id).await?;

    let dispatcher = state.dispatcher();
    dispatcher.dispatch_room_local(room_id, &Message::new(encode(OpCode::VideoSet, &item)?));
    if item.is_some() {
        dispatcher.dispatch_room_local(room_id, &Message::new(encode(OpCode::PlayerState, &playback)?));
    }
    Ok(())
}

/// Handles PlayerState packets
pub struct PlayerStateHandler;

#[async_trait]
impl PacketHandler for PlayerStateHandler {
    async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, packet: &Packet) -> HandlerResult<()> {
        let session = conn.session();
        let room_id = session.room_id();
        if room_id.is_zero() || !permitted(&session, Permissions::VIDEO_REMOTE, packet.op) {
            return Ok(());
        }

        let payload: PlayerStatePayload = decode(packet)?;
        let playback = PlayerState {
            playing: payload.playing,
            current_time: payload.current_time,
            playback_start: Utc::now(),
        };

        state
            .dispatcher()
            .dispatch_room(
                room_id,
                Message::new(encode(OpCode::PlayerState, &playback)?).ignoring(session.id()),
            )
            .await?;

        state
            .store()
            .hset(&keys::room_state(room_id), &state_to_fields(&playback))
            .await?;
        Ok(())
    }
}

/// Handles Seek packets
pub struct SeekHandler;

#[async_trait]
impl PacketHandler for SeekHandler {
    async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, packet: &Packet) -> HandlerResult<()> {
        let session = conn.session();
        let room_id = session.room_id();
        if room_id.is_zero() || !permitted(&session, Permissions::VIDEO_REMOTE, packet.op) {
            return Ok(());
        }

        let time: f64 = decode(packet)?;
        state
            .dispatcher()
            .dispatch_room(room_id, Message::new(encode(OpCode::Seek, &time)?).ignoring(session.id()))
            .await?;

        state
            .store()
            .hset(
                &keys::room_state(room_id),
                &[
                    (state_fields::CURRENT_TIME, time.to_string()),
                    (state_fields::PLAYBACK_START, Utc::now().to_rfc3339()),
                ],
            )
            .await?;
        Ok(())
    }
}

/// Handles VideoSkip packets
pub struct VideoSkipHandler;

#[async_trait]
impl PacketHandler for VideoSkipHandler {
    async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, packet: &Packet) -> HandlerResult<()> {
        let session = conn.session();
        let room_id = session.room_id();
        if room_id.is_zero() || !permitted(&session, Permissions::VIDEO_REMOTE, packet.op) {
            return Ok(());
        }

        next_item(state, room_id)
            .await
            .map_err(|err| err.with_code(ErrorCode::NextItem))
    }
}

/// Handles VideoEnd packets
///
/// The queue advances once at least half the room reported the end of the
/// current item. The store picks a single winning vote per item, so concurrent
/// reports on several nodes advance it once.
pub struct VideoEndHandler;

#[async_trait]
impl PacketHandler for VideoEndHandler {
    async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, packet: &Packet) -> HandlerResult<()> {
        let session = conn.session();
        let room_id = session.room_id();
        if room_id.is_zero() {
            return Ok(());
        }

        let item_id: String = decode(packet)?;
        let item_key = keys::room_current_item(room_id);
        let votes_key = keys::room_video_end_ack(room_id);
        let voters_key = keys::room_users(room_id);
        let voter = session.user_id().to_string();
        let vote = EndVote {
            item_key: &item_key,
            item_id: &item_id,
            votes_key: &votes_key,
            voters_key: &voters_key,
            voter: &voter,
        };

        if state.store().vote_item_end(&vote).await? {
            tracing::debug!(room_id = %room_id, item_id = %item_id, "Current item ended");
            next_item(state, room_id)
                .await
                .map_err(|err| err.with_code(ErrorCode::NextItem))?;
        }
        Ok(())
    }
}
