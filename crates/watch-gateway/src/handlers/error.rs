//! Handler error types
//!
//! Every failure a handler can hit maps to one strategy: authentication failures
//! close the socket, gateway failures are logged under a fresh id that is sent to
//! the client, and malformed payloads are ignored.

use crate::broadcast::DispatchError;
use crate::connection::SendError;
use thiserror::Error;
use uuid::Uuid;
use watch_cache::{PubSubError, StoreError};
use watch_core::DomainError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Category of a gateway failure, reported to clients only through its id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    Database = 100,
    Redis = 101,
    ClientSend = 102,
    Dispatch = 103,
    NextItem = 104,
    SetCurrentItem = 105,
    SendState = 106,
    Crawler = 107,
    AddClient = 108,
    RemoveClient = 109,
    Parse = 110,
    Serialize = 111,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Database => "Database Error",
            Self::Redis => "Redis Error",
            Self::ClientSend => "Failed to send message",
            Self::Dispatch => "Failed to dispatch message",
            Self::NextItem => "Failed to play next item",
            Self::SetCurrentItem => "Failed to set current item",
            Self::SendState => "Failed to send room state",
            Self::Crawler => "Crawler Error",
            Self::AddClient => "Failed to add client to room",
            Self::RemoveClient => "Failed to remove client from room",
            Self::Parse => "Failed to parse data",
            Self::Serialize => "Failed to serialize data",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Handler error type
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Bad token, unknown user or session hijack attempt; closes the socket
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Store, database, dispatch or send failure
    #[error("{code} ({id})")]
    Gateway {
        id: Uuid,
        code: ErrorCode,
        #[source]
        source: BoxError,
    },

    /// Payload did not match the op code
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),
}

impl HandlerError {
    /// Gateway failure with a fresh error id
    pub fn gateway(code: ErrorCode, source: impl Into<BoxError>) -> Self {
        Self::Gateway {
            id: Uuid::new_v4(),
            code,
            source: source.into(),
        }
    }

    /// Re-categorize a gateway failure, keeping its id
    #[must_use]
    pub fn with_code(self, code: ErrorCode) -> Self {
        match self {
            Self::Gateway { id, source, .. } => Self::Gateway { id, code, source },
            other => other,
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Gateway { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        Self::gateway(ErrorCode::Redis, err)
    }
}

impl From<PubSubError> for HandlerError {
    fn from(err: PubSubError) -> Self {
        Self::gateway(ErrorCode::Redis, err)
    }
}

impl From<DomainError> for HandlerError {
    fn from(err: DomainError) -> Self {
        Self::gateway(ErrorCode::Database, err)
    }
}

impl From<DispatchError> for HandlerError {
    fn from(err: DispatchError) -> Self {
        Self::gateway(ErrorCode::Dispatch, err)
    }
}

impl From<SendError> for HandlerError {
    fn from(err: SendError) -> Self {
        Self::gateway(ErrorCode::ClientSend, err)
    }
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;
