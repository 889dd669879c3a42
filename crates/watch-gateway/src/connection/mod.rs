//! Connection management
//!
//! Sockets, sessions, and the process-local indexes over them.

mod clients;
mod connection;
mod session;
mod sessions;

pub use clients::ClientRegistry;
pub use connection::{Connection, Frame, SendError};
pub use session::{Session, SessionRecord, SessionState};
pub use sessions::SessionRegistry;
