//! Built-in room roles and the per-session role set
//!
//! Roles are fixed: the relational store only records which role ids a user holds
//! in a room. Authority between users is compared by the `order` of their highest
//! role.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::Permissions;

/// Identifier of a built-in role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(i32);

impl RoleId {
    pub const MEMBER: RoleId = RoleId(1);
    pub const MANAGER: RoleId = RoleId(2);
    pub const HOST: RoleId = RoleId(3);

    #[inline]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn into_inner(self) -> i32 {
        self.0
    }

    /// Look up the built-in role definition
    pub fn role(self) -> Option<&'static Role> {
        Role::find(self)
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for RoleId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

/// A built-in role definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: &'static str,
    /// Authority rank, higher wins
    pub order: i32,
    pub permissions: Permissions,
}

const ROLES: [Role; 3] = [
    Role {
        id: RoleId::MEMBER,
        name: "member",
        order: 1,
        permissions: Permissions::QUEUE_ADD,
    },
    Role {
        id: RoleId::MANAGER,
        name: "manager",
        order: 2,
        permissions: Permissions::QUEUE_ADD
            .union(Permissions::QUEUE_EDIT)
            .union(Permissions::VIDEO_REMOTE)
            .union(Permissions::KICK_MEMBERS)
            .union(Permissions::MANAGE_ROOM),
    },
    Role {
        id: RoleId::HOST,
        name: "host",
        order: 3,
        permissions: Permissions::ALL,
    },
];

impl Role {
    /// Find a built-in role by id
    pub fn find(id: RoleId) -> Option<&'static Role> {
        ROLES.iter().find(|role| role.id == id)
    }

    /// All built-in roles, lowest authority first
    pub fn all() -> &'static [Role] {
        &ROLES
    }
}

/// The roles a session holds in its current room
///
/// Unknown role ids are kept (so they round-trip) but grant nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet {
    roles: BTreeSet<RoleId>,
}

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role, returns false if it was already present
    pub fn add(&mut self, role: RoleId) -> bool {
        self.roles.insert(role)
    }

    /// Remove a role, returns false if it was not present
    pub fn remove(&mut self, role: RoleId) -> bool {
        self.roles.remove(&role)
    }

    pub fn contains(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn ids(&self) -> Vec<RoleId> {
        self.roles.iter().copied().collect()
    }

    /// The known role with the highest order
    pub fn max(&self) -> Option<&'static Role> {
        self.roles
            .iter()
            .filter_map(|id| Role::find(*id))
            .max_by_key(|role| role.order)
    }

    /// Order of the highest role, 0 when the set holds no known role
    pub fn max_order(&self) -> i32 {
        self.max().map_or(0, |role| role.order)
    }

    /// Union of the permissions of every held role
    pub fn permissions(&self) -> Permissions {
        Permissions::combine(
            self.roles
                .iter()
                .filter_map(|id| Role::find(*id))
                .map(|role| role.permissions),
        )
    }

    pub fn has_permission(&self, permission: Permissions) -> bool {
        self.permissions().has(permission)
    }
}

impl FromIterator<RoleId> for RoleSet {
    fn from_iter<I: IntoIterator<Item = RoleId>>(iter: I) -> Self {
        Self {
            roles: iter.into_iter().collect(),
        }
    }
}
