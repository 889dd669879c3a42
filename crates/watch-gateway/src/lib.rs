//! # watch-gateway
//!
//! WebSocket gateway for synchronized group playback.
//!
//! Every node keeps its own sockets, sessions and room views in memory. Shared state
//! (session records, room membership, queues, player state) lives in the key-value
//! store, and nodes reach each other's sockets through the pub/sub transport.

pub mod broadcast;
pub mod connection;
pub mod handlers;
pub mod protocol;
pub mod room;
pub mod server;
pub mod tasks;

pub use broadcast::{Dispatcher, Message, MessageKind, MessageTarget};
pub use connection::{ClientRegistry, Connection, Frame, Session, SessionRegistry};
pub use handlers::{HandlerError, HandlerManager, HandlerResult};
pub use protocol::{OpCode, Packet};
pub use room::{Room, RoomRegistry};
pub use server::{create_app, create_gateway_state, run, GatewayParts, GatewayState, Repositories};
pub use tasks::TaskPool;
