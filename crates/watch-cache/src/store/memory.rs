//! In-process implementation of [`KeyValueStore`]
//!
//! Follows Redis semantics closely enough for multi-node tests: empty collections
//! vanish, TTLs expire lazily on access, batches apply under one lock.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::scripts::quorum;
use super::{EndVote, KeyValueStore, StoreCommand, StoreError, StoreResult, WriteBatch};
use crate::keys::item_fields;

#[derive(Debug)]
enum Value {
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    List(VecDeque<String>),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Self::Hash(h) => h.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::List(l) => l.is_empty(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    fn purge_if_expired(&mut self, key: &str) {
        let expired = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.entries.remove(key);
        }
    }

    fn entry(&mut self, key: &str) -> Option<&mut Entry> {
        self.purge_if_expired(key);
        self.entries.get_mut(key)
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(|e| e.value.is_empty()) {
            self.entries.remove(key);
        }
    }

    fn hash(&mut self, key: &str) -> StoreResult<Option<&mut HashMap<String, String>>> {
        match self.entry(key) {
            None => Ok(None),
            Some(Entry { value: Value::Hash(h), .. }) => Ok(Some(h)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn set(&mut self, key: &str) -> StoreResult<Option<&mut HashSet<String>>> {
        match self.entry(key) {
            None => Ok(None),
            Some(Entry { value: Value::Set(s), .. }) => Ok(Some(s)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn list(&mut self, key: &str) -> StoreResult<Option<&mut VecDeque<String>>> {
        match self.entry(key) {
            None => Ok(None),
            Some(Entry { value: Value::List(l), .. }) => Ok(Some(l)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn create(&mut self, key: &str, value: Value) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
    }

    fn hset(&mut self, key: &str, fields: impl IntoIterator<Item = (String, String)>) -> StoreResult<()> {
        if self.hash(key)?.is_none() {
            self.create(key, Value::Hash(HashMap::new()));
        }
        if let Some(hash) = self.hash(key)? {
            hash.extend(fields);
        }
        self.drop_if_empty(key);
        Ok(())
    }

    fn hdel(&mut self, key: &str, field: &str) -> StoreResult<bool> {
        let removed = self.hash(key)?.is_some_and(|h| h.remove(field).is_some());
        self.drop_if_empty(key);
        Ok(removed)
    }

    fn sadd(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        if self.set(key)?.is_none() {
            self.create(key, Value::Set(HashSet::new()));
        }
        Ok(self.set(key)?.is_some_and(|s| s.insert(member.to_string())))
    }

    fn srem(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        let removed = self.set(key)?.is_some_and(|s| s.remove(member));
        self.drop_if_empty(key);
        Ok(removed)
    }

    fn rpush(&mut self, key: &str, value: &str) -> StoreResult<usize> {
        if self.list(key)?.is_none() {
            self.create(key, Value::List(VecDeque::new()));
        }
        Ok(self.list(key)?.map_or(0, |l| {
            l.push_back(value.to_string());
            l.len()
        }))
    }

    fn del(&mut self, key: &str) -> bool {
        self.purge_if_expired(key);
        self.entries.remove(key).is_some()
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> bool {
        match self.entry(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }
    }

    fn persist(&mut self, key: &str) -> bool {
        self.entry(key)
            .is_some_and(|entry| entry.expires_at.take().is_some())
    }

    fn execute(&mut self, command: StoreCommand) -> StoreResult<()> {
        match command {
            StoreCommand::HSet { key, fields } => self.hset(&key, fields),
            StoreCommand::HDel { key, field } => self.hdel(&key, &field).map(drop),
            StoreCommand::Del { key } => {
                self.del(&key);
                Ok(())
            }
            StoreCommand::SAdd { key, member } => self.sadd(&key, &member).map(drop),
            StoreCommand::SRem { key, member } => self.srem(&key, &member).map(drop),
            StoreCommand::RPush { key, value } => self.rpush(&key, &value).map(drop),
            StoreCommand::Expire { key, ttl } => {
                self.expire(&key, ttl);
                Ok(())
            }
            StoreCommand::Persist { key } => {
                self.persist(&key);
                Ok(())
            }
        }
    }
}

/// Shared in-memory keyspace, one instance stands in for the whole fleet's Redis
#[derive(Debug, Default)]
pub struct MemoryStore {
    keyspace: Mutex<Keyspace>,
    writes: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write commands applied so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let mut keyspace = self.keyspace.lock();
        let now = Instant::now();
        keyspace
            .entries
            .retain(|_, e| e.expires_at.is_none_or(|at| at > now));
        keyspace.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn wrote(&self, commands: usize) {
        self.writes.fetch_add(commands, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace.hash(key)?.and_then(|h| h.get(field).cloned()))
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace.hash(key)?.map(|h| h.clone()).unwrap_or_default())
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        self.wrote(1);
        let mut keyspace = self.keyspace.lock();
        keyspace.hset(
            key,
            fields.iter().map(|(f, v)| ((*f).to_string(), v.clone())),
        )
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        self.wrote(1);
        self.keyspace.lock().hdel(key, field)
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.wrote(1);
        self.keyspace.lock().sadd(key, member)
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.wrote(1);
        self.keyspace.lock().srem(key, member)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace
            .set(key)?
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> StoreResult<usize> {
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace.set(key)?.map_or(0, |s| s.len()))
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace.set(key)?.is_some_and(|s| s.contains(member)))
    }

    async fn rpush(&self, key: &str, value: &str) -> StoreResult<usize> {
        self.wrote(1);
        self.keyspace.lock().rpush(key, value)
    }

    async fn lpop(&self, key: &str) -> StoreResult<Option<String>> {
        self.wrote(1);
        let mut keyspace = self.keyspace.lock();
        let popped = keyspace.list(key)?.and_then(VecDeque::pop_front);
        keyspace.drop_if_empty(key);
        Ok(popped)
    }

    async fn llen(&self, key: &str) -> StoreResult<usize> {
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace.list(key)?.map_or(0, |l| l.len()))
    }

    async fn lrange(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace
            .list(key)?
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn lrem(&self, key: &str, count: usize, value: &str) -> StoreResult<usize> {
        self.wrote(1);
        let mut keyspace = self.keyspace.lock();
        let mut removed = 0;
        if let Some(list) = keyspace.list(key)? {
            list.retain(|item| {
                if item == value && (count == 0 || removed < count) {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }
        keyspace.drop_if_empty(key);
        Ok(removed)
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        self.wrote(1);
        Ok(self.keyspace.lock().del(key))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.keyspace.lock().entry(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.wrote(1);
        Ok(self.keyspace.lock().expire(key, ttl))
    }

    async fn persist(&self, key: &str) -> StoreResult<bool> {
        self.wrote(1);
        Ok(self.keyspace.lock().persist(key))
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace
            .entry(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now())))
    }

    async fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        self.wrote(batch.len());
        let mut keyspace = self.keyspace.lock();
        for command in batch.into_commands() {
            keyspace.execute(command)?;
        }
        Ok(())
    }

    async fn smembers_many(&self, keys: &[String]) -> StoreResult<Vec<Vec<String>>> {
        let mut keyspace = self.keyspace.lock();
        keys.iter()
            .map(|key| {
                Ok(keyspace
                    .set(key)?
                    .map(|s| s.iter().cloned().collect())
                    .unwrap_or_default())
            })
            .collect()
    }

    async fn hget_many(&self, keys: &[String], field: &str) -> StoreResult<Vec<Option<String>>> {
        let mut keyspace = self.keyspace.lock();
        keys.iter()
            .map(|key| Ok(keyspace.hash(key)?.and_then(|h| h.get(field).cloned())))
            .collect()
    }

    async fn srem_unless_guarded(&self, key: &str, member: &str, guard: &str) -> StoreResult<bool> {
        let mut keyspace = self.keyspace.lock();
        if keyspace.set(guard)?.is_some_and(|s| !s.is_empty()) {
            return Ok(false);
        }
        self.wrote(1);
        keyspace.srem(key, member)
    }

    async fn vote_item_end(&self, vote: &EndVote<'_>) -> StoreResult<bool> {
        let mut keyspace = self.keyspace.lock();
        let open = keyspace.hash(vote.item_key)?.is_some_and(|item| {
            item.get(item_fields::ID).is_some_and(|id| id == vote.item_id)
                && !item.contains_key(item_fields::ENDED)
        });
        if !open {
            return Ok(false);
        }

        self.wrote(1);
        keyspace.sadd(vote.votes_key, vote.voter)?;
        let votes = keyspace.set(vote.votes_key)?.map_or(0, |s| s.len());
        let voters = keyspace.set(vote.voters_key)?.map_or(0, |s| s.len());
        if !quorum(votes, voters) {
            return Ok(false);
        }

        self.wrote(2);
        keyspace.hset(vote.item_key, [(item_fields::ENDED.to_string(), "1".to_string())])?;
        keyspace.del(vote.votes_key);
        Ok(true)
    }
}
