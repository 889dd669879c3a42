//! Key schema of the shared store
//!
//! | key | type |
//! |---|---|
//! | `session:{id}` | hash: `id`, `user_id`, `room_id`, `node_id` |
//! | `user:{uid}:sessions` | set of session ids |
//! | `room:{id}:users` | set of user ids |
//! | `room:{id}:user:{uid}:sessions` | set of session ids |
//! | `room:{id}:queue` | list of item ids |
//! | `room:{id}:queue:items` | hash item id -> JSON item |
//! | `room:{id}:current_item` | hash: `id`, `type`, `url`, `title`, `icon`, `author`, `ended` once voted over |
//! | `room:{id}:state` | hash: `playing`, `currentTime`, `playbackStart` |
//! | `room:{id}:video_end_ack` | set of user ids |
//! | `room:{id}:join_requests` | hash user id -> `0` pending / `1` accepted |

use watch_core::{RoomId, UserId};

/// Field names of the session hash
pub mod fields {
    pub const ID: &str = "id";
    pub const USER_ID: &str = "user_id";
    pub const ROOM_ID: &str = "room_id";
    pub const NODE_ID: &str = "node_id";
}

/// Field names of the current item hash
pub mod item_fields {
    pub const ID: &str = "id";
    pub const TYPE: &str = "type";
    pub const URL: &str = "url";
    pub const TITLE: &str = "title";
    pub const ICON: &str = "icon";
    pub const AUTHOR: &str = "author";
    /// Set once enough of the room reported the end of the item
    pub const ENDED: &str = "ended";
}

/// Values of the join request hash
pub mod join_request {
    pub const PENDING: &str = "0";
    pub const ACCEPTED: &str = "1";
}

pub fn session(session_id: &str) -> String {
    format!("session:{session_id}")
}

pub fn user_sessions(user_id: UserId) -> String {
    format!("user:{user_id}:sessions")
}

pub fn room_users(room_id: RoomId) -> String {
    format!("room:{room_id}:users")
}

pub fn room_user_sessions(room_id: RoomId, user_id: UserId) -> String {
    format!("room:{room_id}:user:{user_id}:sessions")
}

pub fn room_queue(room_id: RoomId) -> String {
    format!("room:{room_id}:queue")
}

pub fn room_queue_items(room_id: RoomId) -> String {
    format!("room:{room_id}:queue:items")
}

pub fn room_current_item(room_id: RoomId) -> String {
    format!("room:{room_id}:current_item")
}

pub fn room_state(room_id: RoomId) -> String {
    format!("room:{room_id}:state")
}

pub fn room_video_end_ack(room_id: RoomId) -> String {
    format!("room:{room_id}:video_end_ack")
}

pub fn room_join_requests(room_id: RoomId) -> String {
    format!("room:{room_id}:join_requests")
}
