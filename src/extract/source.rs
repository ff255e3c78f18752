//! Key-value sources holding live quiz session data.
//!
//! The extractor only needs four operation shapes from the store: string get,
//! sorted set range with scores, list range and delete-by-prefix. Anything
//! providing them can back extraction.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::SourceError;

/// Operations the extractor consumes from a key-value store.
///
/// Implementations are shared between workers and must be safe to call
/// concurrently.
#[async_trait]
pub trait KeyValueSource: Send + Sync {
    /// Returns the string stored at `key`, or `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, SourceError>;

    /// Returns every member of the sorted set at `key` with its score,
    /// lowest score first. An absent key reads as an empty set.
    async fn sorted_set_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>, SourceError>;

    /// Returns the whole list at `key`. An absent key reads as an empty list.
    async fn list_range(&self, key: &str) -> Result<Vec<String>, SourceError>;

    /// Deletes every key starting with `prefix`, returning how many were removed.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, SourceError>;
}

/// Redis-backed key-value source.
#[derive(Clone)]
pub struct RedisSource {
    /// Connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    /// Keys requested per SCAN round trip when deleting by prefix.
    scan_count: usize,
}

impl RedisSource {
    /// Connects to Redis at `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self, SourceError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;
        Ok(Self::from_connection(redis))
    }

    /// Creates a source from an existing connection manager.
    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self {
            redis,
            scan_count: 500,
        }
    }
}

#[async_trait]
impl KeyValueSource for RedisSource {
    async fn get(&self, key: &str) -> Result<Option<String>, SourceError> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn sorted_set_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>, SourceError> {
        let mut conn = self.redis.clone();
        let members: Vec<(String, f64)> = conn.zrange_withscores(key, 0, -1).await?;
        Ok(members)
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, SourceError> {
        let mut conn = self.redis.clone();
        let items: Vec<String> = conn.lrange(key, 0, -1).await?;
        Ok(items)
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, SourceError> {
        let mut conn = self.redis.clone();
        let pattern = format!("{}*", escape_glob(prefix));

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_count)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        if keys.is_empty() {
            return Ok(0);
        }
        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();

        let mut deleted = 0;
        for chunk in keys.chunks(self.scan_count) {
            let removed: usize = conn.del(chunk).await?;
            deleted += removed;
        }
        Ok(deleted)
    }
}

/// Escapes Redis glob metacharacters so `value` only matches itself.
pub fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '^') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    SortedSet(Vec<(String, f64)>),
    List(Vec<String>),
}

impl StoredValue {
    fn kind(&self) -> &'static str {
        match self {
            StoredValue::Text(_) => "string",
            StoredValue::SortedSet(_) => "zset",
            StoredValue::List(_) => "list",
        }
    }
}

/// In-process key-value source with the same semantics as [`RedisSource`].
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock()
            .insert(key.into(), StoredValue::Text(value.into()));
    }

    /// Appends `items` to the list at `key`, creating it if needed.
    pub fn push(&self, key: impl Into<String>, items: &[&str]) {
        let mut entries = self.lock();
        let entry = entries
            .entry(key.into())
            .or_insert_with(|| StoredValue::List(Vec::new()));
        if let StoredValue::List(list) = entry {
            list.extend(items.iter().map(|s| s.to_string()));
        } else {
            *entry = StoredValue::List(items.iter().map(|s| s.to_string()).collect());
        }
    }

    /// Adds or updates `member` in the sorted set at `key`.
    pub fn add_scored(&self, key: impl Into<String>, member: impl Into<String>, score: f64) {
        let member = member.into();
        let mut entries = self.lock();
        let entry = entries
            .entry(key.into())
            .or_insert_with(|| StoredValue::SortedSet(Vec::new()));
        if !matches!(entry, StoredValue::SortedSet(_)) {
            *entry = StoredValue::SortedSet(Vec::new());
        }
        if let StoredValue::SortedSet(set) = entry {
            set.retain(|(m, _)| *m != member);
            set.push((member, score));
            set.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        }
    }

    /// Removes a key, returning whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Returns all keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredValue>> {
        // A poisoned map is still structurally valid
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wrong_type(key: &str, found: &StoredValue) -> SourceError {
        SourceError::Backend(format!(
            "WRONGTYPE key '{}' holds a {} value",
            key,
            found.kind()
        ))
    }
}

#[async_trait]
impl KeyValueSource for MemorySource {
    async fn get(&self, key: &str) -> Result<Option<String>, SourceError> {
        match self.lock().get(key) {
            None => Ok(None),
            Some(StoredValue::Text(value)) => Ok(Some(value.clone())),
            Some(other) => Err(Self::wrong_type(key, other)),
        }
    }

    async fn sorted_set_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>, SourceError> {
        match self.lock().get(key) {
            None => Ok(Vec::new()),
            Some(StoredValue::SortedSet(set)) => Ok(set.clone()),
            Some(other) => Err(Self::wrong_type(key, other)),
        }
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, SourceError> {
        match self.lock().get(key) {
            None => Ok(Vec::new()),
            Some(StoredValue::List(list)) => Ok(list.clone()),
            Some(other) => Err(Self::wrong_type(key, other)),
        }
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, SourceError> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }
}
