//! User entity - the public profile shown to other room members

use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// User entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub discriminator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            discriminator: "0000".to_string(),
            avatar: None,
        }
    }

    /// Username with discriminator, e.g. `alice#0001`
    pub fn tag(&self) -> String {
        format!("{}#{}", self.username, self.discriminator)
    }
}
