//! Op code routing
//!
//! Maps each op code to an ordered list of handlers. Client packets and server
//! messages have separate tables.

use super::{HandlerError, HandlerResult};
use crate::broadcast::Message;
use crate::connection::Connection;
use crate::protocol::{OpCode, Packet};
use crate::server::GatewayState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Handles a packet read from a client socket
#[async_trait]
pub trait PacketHandler: Send + Sync {
    async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, packet: &Packet) -> HandlerResult<()>;
}

/// Handles a fleet-internal server message
#[async_trait]
pub trait ServerHandler: Send + Sync {
    async fn handle(&self, state: &GatewayState, message: &Message) -> HandlerResult<()>;
}

/// Registration table for packet and server handlers
#[derive(Default)]
pub struct HandlerManager {
    handlers: HashMap<OpCode, Vec<Arc<dyn PacketHandler>>>,
    server_handlers: HashMap<OpCode, Vec<Arc<dyn ServerHandler>>>,
}

impl HandlerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager with every built-in handler registered
    pub fn with_defaults() -> Self {
        let mut manager = Self::new();
        super::register_defaults(&mut manager);
        manager
    }

    /// Append a handler for `op`; handlers for one op run in registration order
    pub fn register_handler(&mut self, op: OpCode, handler: impl PacketHandler + 'static) -> &mut Self {
        self.handlers.entry(op).or_default().push(Arc::new(handler));
        self
    }

    pub fn register_server_handler(&mut self, op: OpCode, handler: impl ServerHandler + 'static) -> &mut Self {
        self.server_handlers.entry(op).or_default().push(Arc::new(handler));
        self
    }

    pub fn has_handler(&self, op: OpCode) -> bool {
        self.handlers.contains_key(&op)
    }

    pub fn has_server_handler(&self, op: OpCode) -> bool {
        self.server_handlers.contains_key(&op)
    }

    /// Run every handler registered for the packet's op code
    ///
    /// Stops at the first failure, which is reported to the connection.
    pub async fn handle(&self, state: &GatewayState, conn: &Arc<Connection>, packet: &Packet) {
        let Some(handlers) = self.handlers.get(&packet.op) else {
            tracing::debug!(op = %packet.op, "No handler registered");
            return;
        };

        for handler in handlers {
            if let Err(err) = handler.handle(state, conn, packet).await {
                Self::report_error(conn, packet.op, err).await;
                return;
            }
        }
    }

    /// Handle a packet read from a client socket
    ///
    /// Server-only op codes are dropped, and an unauthenticated connection may only
    /// send `Authenticate`.
    pub async fn handle_client(&self, state: &GatewayState, conn: &Arc<Connection>, packet: &Packet) {
        if !packet.op.is_client_op() {
            if packet.op == OpCode::Disconnect {
                tracing::warn!(session_id = %conn.session_id(), "Client sent Disconnect");
            } else {
                tracing::debug!(session_id = %conn.session_id(), op = %packet.op, "Ignoring server-only op code");
            }
            return;
        }

        if packet.op != OpCode::Authenticate && !conn.session().is_authenticated() {
            tracing::debug!(session_id = %conn.session_id(), op = %packet.op, "Ignoring packet before authentication");
            return;
        }

        self.handle(state, conn, packet).await;
    }

    /// Run every server handler registered for the message's op code
    pub async fn handle_server(&self, state: &GatewayState, message: &Message) {
        let Some(handlers) = self.server_handlers.get(&message.op()) else {
            tracing::debug!(op = %message.op(), "No server handler registered");
            return;
        };

        for handler in handlers {
            if let Err(err) = handler.handle(state, message).await {
                tracing::error!(op = %message.op(), error = %err, "Server handler failed");
                return;
            }
        }
    }

    async fn report_error(conn: &Arc<Connection>, op: OpCode, err: HandlerError) {
        let session_id = conn.session_id();
        match err {
            HandlerError::Auth(reason) => {
                tracing::warn!(session_id = %session_id, reason = %reason, "Authentication failed");
                conn.disconnect();
            }
            HandlerError::Gateway { id, code, source } => {
                tracing::error!(
                    session_id = %session_id,
                    error_id = %id,
                    code = code.as_u16(),
                    op = %op,
                    error = %source,
                    "{code}"
                );
                if let Err(err) = conn.send(Packet::error(id)).await {
                    tracing::debug!(session_id = %session_id, error = %err, "Failed to report error");
                }
                if op == OpCode::Authenticate {
                    conn.disconnect();
                }
            }
            HandlerError::InvalidPayload(err) => {
                tracing::debug!(session_id = %session_id, op = %op, error = %err, "Ignoring malformed payload");
            }
        }
    }
}

impl std::fmt::Debug for HandlerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerManager")
            .field("handlers", &self.handlers.len())
            .field("server_handlers", &self.server_handlers.len())
            .finish()
    }
}
