//! Repository traits (ports) - define the interface for data access
//!
//! The gateway only reads users and rooms and edits role grants; everything else
//! about those records belongs to other services. An absent row is `Ok(None)` (or an
//! empty collection), never an error.

use async_trait::async_trait;

use crate::entities::{Room, RoomMember, User, UserRole};
use crate::error::DomainError;
use crate::value_objects::{RoleId, RoomId, UserId};

/// Result type for repository operations
pub type RepoResult<T> = Result<T, DomainError>;

// ============================================================================
// User Repository
// ============================================================================

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find user by ID
    async fn find_by_id(&self, id: UserId) -> RepoResult<Option<User>>;

    /// Load profiles and room roles for a set of users, preserving the order of `ids`
    ///
    /// Ids without a user row are skipped.
    async fn find_room_members(&self, ids: &[UserId], room_id: RoomId)
        -> RepoResult<Vec<RoomMember>>;
}

// ============================================================================
// Room Repository
// ============================================================================

#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Find room by ID
    async fn find_by_id(&self, id: RoomId) -> RepoResult<Option<Room>>;
}

// ============================================================================
// Role Repository
// ============================================================================

#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Role ids a user holds in a room
    async fn find_user_roles(&self, user_id: UserId, room_id: RoomId) -> RepoResult<Vec<RoleId>>;

    /// Grant a role (no-op if already granted)
    async fn add(&self, user_role: &UserRole) -> RepoResult<()>;

    /// Revoke a role (no-op if not granted)
    async fn remove(&self, user_role: &UserRole) -> RepoResult<()>;
}
