//! Test fixtures
//!
//! In-memory users, rooms and role grants standing in for Postgres, plus a token
//! verifier that accepts `token-{user_id}`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use watch_common::{AppError, TokenVerifier};
use watch_core::{
    RepoResult, RoleId, RoleRepository, Room, RoomId, RoomMember, RoomRepository, User, UserId,
    UserRepository, UserRole,
};

/// Counter for unique ids across tests
static COUNTER: AtomicI64 = AtomicI64::new(1);

/// Get a unique id for test data
pub fn unique_id() -> i64 {
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Bearer token the test verifier maps to `user_id`
pub fn token_for(user_id: UserId) -> String {
    format!("token-{user_id}")
}

/// Users, rooms and role grants shared by every node of a test cluster
#[derive(Debug, Default)]
pub struct Directory {
    users: Mutex<HashMap<UserId, User>>,
    rooms: Mutex<HashMap<RoomId, Room>>,
    roles: Mutex<HashMap<(UserId, RoomId), Vec<RoleId>>>,
}

impl Directory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a user with a unique id
    pub fn add_user(&self, username: &str) -> UserId {
        let id = UserId::new(unique_id());
        self.users.lock().insert(id, User::new(id, username));
        id
    }

    /// Register a room with a unique id, owned by `owner` who holds the host role
    pub fn add_room(&self, owner: UserId, private: bool) -> RoomId {
        let id = RoomId::new(unique_id());
        self.rooms.lock().insert(
            id,
            Room {
                id,
                name: format!("room {id}"),
                owner_id: owner,
                private,
            },
        );
        self.grant(owner, id, RoleId::HOST);
        id
    }

    /// Delete a room, as if its owner removed it while members were away
    pub fn remove_room(&self, room_id: RoomId) {
        self.rooms.lock().remove(&room_id);
        self.roles.lock().retain(|(_, room), _| *room != room_id);
    }

    pub fn grant(&self, user_id: UserId, room_id: RoomId, role_id: RoleId) {
        let mut roles = self.roles.lock();
        let held = roles.entry((user_id, room_id)).or_default();
        if !held.contains(&role_id) {
            held.push(role_id);
        }
    }

    pub fn roles_of(&self, user_id: UserId, room_id: RoomId) -> Vec<RoleId> {
        self.roles.lock().get(&(user_id, room_id)).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl UserRepository for Directory {
    async fn find_by_id(&self, id: UserId) -> RepoResult<Option<User>> {
        Ok(self.users.lock().get(&id).cloned())
    }

    async fn find_room_members(&self, ids: &[UserId], room_id: RoomId) -> RepoResult<Vec<RoomMember>> {
        let users = self.users.lock();
        Ok(ids
            .iter()
            .filter_map(|id| users.get(id))
            .map(|user| RoomMember {
                user: user.clone(),
                roles: self.roles_of(user.id, room_id),
            })
            .collect())
    }
}

#[async_trait]
impl RoomRepository for Directory {
    async fn find_by_id(&self, id: RoomId) -> RepoResult<Option<Room>> {
        Ok(self.rooms.lock().get(&id).cloned())
    }
}

#[async_trait]
impl RoleRepository for Directory {
    async fn find_user_roles(&self, user_id: UserId, room_id: RoomId) -> RepoResult<Vec<RoleId>> {
        Ok(self.roles_of(user_id, room_id))
    }

    async fn add(&self, user_role: &UserRole) -> RepoResult<()> {
        self.grant(user_role.user_id, user_role.room_id, user_role.role_id);
        Ok(())
    }

    async fn remove(&self, user_role: &UserRole) -> RepoResult<()> {
        if let Some(held) = self.roles.lock().get_mut(&(user_role.user_id, user_role.room_id)) {
            held.retain(|role| *role != user_role.role_id);
        }
        Ok(())
    }
}

/// Accepts `token-{user_id}` and nothing else
#[derive(Debug, Clone, Copy, Default)]
pub struct TestTokens;

impl TokenVerifier for TestTokens {
    fn verify(&self, token: &str) -> Result<UserId, AppError> {
        token
            .strip_prefix("token-")
            .and_then(|id| UserId::parse(id).ok())
            .filter(|id| !id.is_zero())
            .ok_or(AppError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_round_trip_user() {
        let user = UserId::new(77);
        assert_eq!(TestTokens.verify(&token_for(user)).unwrap(), user);
        assert!(TestTokens.verify("token-0").is_err());
        assert!(TestTokens.verify("garbage").is_err());
    }
}
