//! Pipelined write batches

use std::time::Duration;

/// One write inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCommand {
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    HDel {
        key: String,
        field: String,
    },
    Del {
        key: String,
    },
    SAdd {
        key: String,
        member: String,
    },
    SRem {
        key: String,
        member: String,
    },
    RPush {
        key: String,
        value: String,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    Persist {
        key: String,
    },
}

impl StoreCommand {
    pub fn key(&self) -> &str {
        match self {
            Self::HSet { key, .. }
            | Self::HDel { key, .. }
            | Self::Del { key }
            | Self::SAdd { key, .. }
            | Self::SRem { key, .. }
            | Self::RPush { key, .. }
            | Self::Expire { key, .. }
            | Self::Persist { key } => key,
        }
    }
}

/// Ordered writes applied in a single round trip
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    commands: Vec<StoreCommand>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn hset(self, key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(StoreCommand::HSet {
            key: key.into(),
            fields: vec![(field.into(), value.into())],
        })
    }

    #[must_use]
    pub fn hset_many<K, V>(self, key: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.push(StoreCommand::HSet {
            key: key.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        })
    }

    #[must_use]
    pub fn hdel(self, key: impl Into<String>, field: impl Into<String>) -> Self {
        self.push(StoreCommand::HDel {
            key: key.into(),
            field: field.into(),
        })
    }

    #[must_use]
    pub fn del(self, key: impl Into<String>) -> Self {
        self.push(StoreCommand::Del { key: key.into() })
    }

    #[must_use]
    pub fn sadd(self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.push(StoreCommand::SAdd {
            key: key.into(),
            member: member.into(),
        })
    }

    #[must_use]
    pub fn srem(self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.push(StoreCommand::SRem {
            key: key.into(),
            member: member.into(),
        })
    }

    #[must_use]
    pub fn rpush(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(StoreCommand::RPush {
            key: key.into(),
            value: value.into(),
        })
    }

    #[must_use]
    pub fn expire(self, key: impl Into<String>, ttl: Duration) -> Self {
        self.push(StoreCommand::Expire { key: key.into(), ttl })
    }

    #[must_use]
    pub fn persist(self, key: impl Into<String>) -> Self {
        self.push(StoreCommand::Persist { key: key.into() })
    }

    /// Append a command, for callers building batches in a loop
    #[must_use]
    pub fn push(mut self, command: StoreCommand) -> Self {
        self.commands.push(command);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn commands(&self) -> &[StoreCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<StoreCommand> {
        self.commands
    }
}
