//! Domain errors - error types for the domain layer

use thiserror::Error;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum DomainError {
    /// A media link that could not be resolved into a playable item
    #[error("Media unavailable: {0}")]
    MediaUnavailable(String),

    /// Repository failure, wrapped so the domain does not depend on the driver
    #[error("Database error: {0}")]
    DatabaseError(String),
}
