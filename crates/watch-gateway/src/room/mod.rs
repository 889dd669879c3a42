//! Node-local room views
//!
//! A [`Room`] holds the connections of one logical room that live on this node.
//! Global membership lives in the store.

mod registry;
mod room;

pub use registry::RoomRegistry;
pub use room::Room;
