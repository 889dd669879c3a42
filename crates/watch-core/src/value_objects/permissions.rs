//! Permission bitflags for room actions
//!
//! Permissions are never stored per user. They are derived from the built-in
//! roles a user holds in a room (see [`super::RoleSet`]).

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

bitflags! {
    /// Room permission flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u64 {
        /// Control playback (play, pause, seek, skip)
        const VIDEO_REMOTE  = 1 << 0;
        /// Add items to the queue
        const QUEUE_ADD     = 1 << 1;
        /// Remove any item from the queue, not just your own
        const QUEUE_EDIT    = 1 << 2;
        /// Kick members with a lower role out of the room
        const KICK_MEMBERS  = 1 << 3;
        /// Grant and revoke roles below your own
        const MANAGE_ROLES  = 1 << 4;
        /// Receive and accept join requests for a private room
        const MANAGE_ROOM   = 1 << 5;

        /// Everything a room can grant
        const ALL = Self::VIDEO_REMOTE.bits()
            | Self::QUEUE_ADD.bits()
            | Self::QUEUE_EDIT.bits()
            | Self::KICK_MEMBERS.bits()
            | Self::MANAGE_ROLES.bits()
            | Self::MANAGE_ROOM.bits();
    }
}

impl Permissions {
    /// Check if the permission set contains every bit of `permission`
    #[inline]
    pub fn has(&self, permission: Permissions) -> bool {
        self.contains(permission)
    }

    /// Check if the permission set shares at least one bit with `permissions`
    #[inline]
    pub fn has_any(&self, permissions: Permissions) -> bool {
        self.intersects(permissions)
    }

    /// Combine permissions from multiple roles
    pub fn combine<I>(roles: I) -> Self
    where
        I: IntoIterator<Item = Permissions>,
    {
        roles.into_iter().fold(Permissions::empty(), |acc, p| acc | p)
    }

    /// Get a list of all individual permissions that are set
    pub fn list(&self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).filter(|name| *name != "ALL").collect()
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::empty()
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

impl Serialize for Permissions {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.bits())
    }
}

// Deserialize from number or decimal string
impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct PermissionsVisitor;

        impl Visitor<'_> for PermissionsVisitor {
            type Value = Permissions;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer representing permission bits")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Permissions, E>
            where
                E: de::Error,
            {
                Ok(Permissions::from_bits_truncate(value as u64))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Permissions, E>
            where
                E: de::Error,
            {
                Ok(Permissions::from_bits_truncate(value))
            }

            fn visit_str<E>(self, value: &str) -> Result<Permissions, E>
            where
                E: de::Error,
            {
                value
                    .parse::<u64>()
                    .map(Permissions::from_bits_truncate)
                    .map_err(|_| de::Error::custom("invalid permissions string"))
            }
        }

        deserializer.deserialize_any(PermissionsVisitor)
    }
}

impl From<u64> for Permissions {
    fn from(bits: u64) -> Self {
        Permissions::from_bits_truncate(bits)
    }
}

impl From<Permissions> for u64 {
    fn from(perms: Permissions) -> Self {
        perms.bits()
    }
}
