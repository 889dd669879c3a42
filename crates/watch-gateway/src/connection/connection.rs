//! Individual WebSocket connection
//!
//! A connection owns one socket's outbound queue and lifetime token, and points at
//! exactly one [`Session`]. The session pointer is swapped, not copied, when a
//! client authenticates or reclaims a previous session.

use super::Session;
use crate::protocol::Packet;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Item written to the socket by the connection's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Packet(Packet),
    Ping,
}

/// Error when queueing a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error("outbound buffer full")]
    Full,
}

/// A single WebSocket connection
pub struct Connection {
    id: Uuid,
    session: RwLock<Arc<Session>>,
    sender: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    last_active: Mutex<Instant>,
    /// Set when another socket reclaimed the session
    superseded: AtomicBool,
    created_at: Instant,
}

impl Connection {
    /// Create a new connection with its own lifetime token
    pub fn new(session: Arc<Session>, sender: mpsc::Sender<Frame>) -> Arc<Self> {
        Self::with_cancellation(session, sender, CancellationToken::new())
    }

    /// Create a new connection whose lifetime is `cancel`
    pub fn with_cancellation(
        session: Arc<Session>,
        sender: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            id: Uuid::new_v4(),
            session: RwLock::new(session),
            sender,
            cancel,
            last_active: Mutex::new(now),
            superseded: AtomicBool::new(false),
            created_at: now,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current session
    pub fn session(&self) -> Arc<Session> {
        self.session.read().clone()
    }

    pub fn session_id(&self) -> String {
        self.session.read().id().to_string()
    }

    /// Swap the session, returning the previous one
    pub fn replace_session(&self, session: Arc<Session>) -> Arc<Session> {
        std::mem::replace(&mut *self.session.write(), session)
    }

    /// Queue a packet, waiting for buffer space
    pub async fn send(&self, packet: Packet) -> Result<(), SendError> {
        if self.cancel.is_cancelled() {
            return Err(SendError::Closed);
        }
        self.sender
            .send(Frame::Packet(packet.stamped()))
            .await
            .map_err(|_| SendError::Closed)
    }

    /// Queue a packet without waiting
    ///
    /// Used on fanout paths so one slow socket never stalls delivery to the rest.
    pub fn try_send(&self, packet: Packet) -> Result<(), SendError> {
        if self.cancel.is_cancelled() {
            return Err(SendError::Closed);
        }
        self.sender
            .try_send(Frame::Packet(packet.stamped()))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => SendError::Full,
                mpsc::error::TrySendError::Closed(_) => SendError::Closed,
            })
    }

    /// Queue a keepalive ping, returns false if it could not be queued
    pub fn ping(&self) -> bool {
        self.sender.try_send(Frame::Ping).is_ok()
    }

    /// Record inbound activity
    pub fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    /// Time since the last inbound frame
    pub fn idle_for(&self) -> Duration {
        self.last_active.lock().elapsed()
    }

    /// Close the socket
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    pub fn is_disconnected(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Lifetime token, cancelled when the socket closes
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Mark as replaced by another socket holding the same session
    pub fn mark_superseded(&self) {
        self.superseded.store(true, Ordering::SeqCst);
    }

    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::SeqCst)
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("session_id", &self.session_id())
            .field("superseded", &self.is_superseded())
            .field("disconnected", &self.is_disconnected())
            .finish()
    }
}
