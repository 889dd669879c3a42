//! Message routing
//!
//! The [`Dispatcher`] delivers messages locally and publishes them to other nodes;
//! the [`listener`] feeds messages published by other nodes back into it.

mod dispatcher;
pub mod listener;
mod message;

pub use dispatcher::{DispatchError, DispatchResult, Dispatcher};
pub use message::{CodecError, Message, MessageKind, MessageTarget};
