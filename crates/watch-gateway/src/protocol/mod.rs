//! Gateway protocol definitions
//!
//! Op codes, the packet envelope shared by sockets and pub/sub, and typed payloads.

mod opcodes;
mod packet;
mod payloads;

pub use opcodes::OpCode;
pub use packet::Packet;
pub use payloads::{
    AuthenticatePayload, AuthenticatedPayload, JoinRoomResponse, Notification, NotificationKind,
    PlayerStatePayload, RoleUpdatePayload, SessionTakeoverPayload,
};
