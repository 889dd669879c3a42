//! Session registry
//!
//! Process-local index of authenticated sessions by user.

use super::Session;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use watch_core::UserId;

/// User id -> { session id -> session } for sessions hosted on this node
#[derive(Default)]
pub struct SessionRegistry {
    by_user: DashMap<UserId, HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, session: Arc<Session>) {
        let user_id = session.user_id();
        self.by_user
            .entry(user_id)
            .or_default()
            .insert(session.id().to_string(), session);
    }

    /// Remove a session, only if the registered entry is this exact session
    pub fn remove(&self, session: &Arc<Session>) -> bool {
        let user_id = session.user_id();
        let removed = match self.by_user.get_mut(&user_id) {
            Some(mut sessions) => {
                let matches = sessions
                    .get(session.id())
                    .is_some_and(|current| Arc::ptr_eq(current, session));
                if matches {
                    sessions.remove(session.id());
                }
                matches
            }
            None => false,
        };

        if removed {
            self.by_user.remove_if(&user_id, |_, sessions| sessions.is_empty());
        }

        removed
    }

    pub fn get(&self, user_id: UserId, session_id: &str) -> Option<Arc<Session>> {
        self.by_user
            .get(&user_id)
            .and_then(|sessions| sessions.get(session_id).cloned())
    }

    /// Every local session of a user
    pub fn by_user(&self, user_id: UserId) -> Vec<Arc<Session>> {
        self.by_user
            .get(&user_id)
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    pub fn len(&self) -> usize {
        self.by_user.iter().map(|r| r.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}
