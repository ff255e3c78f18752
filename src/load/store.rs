//! Durable result store abstraction.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// A table name safe to interpolate into SQL.
///
/// Starts with a letter or underscore, continues with ASCII alphanumerics or
/// underscores, and stays within Postgres' 63 byte identifier limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn parse(name: &str) -> Result<Self, StoreError> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if valid_start && valid_rest && name.len() <= 63 {
            Ok(Self(name.to_string()))
        } else {
            Err(StoreError::InvalidTableName(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One quiz in the store's native representation, keyed by quiz id.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizRecord {
    pub id: String,
    pub document: Value,
}

/// Table-level operations the loader needs from a durable store.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Reports whether `table` exists.
    async fn table_exists(&self, table: &TableName) -> Result<bool, StoreError>;

    /// Creates `table` keyed by a string `id`. Creating an existing table
    /// succeeds.
    async fn create_table(&self, table: &TableName) -> Result<(), StoreError>;

    /// Inserts `record` or replaces the record with the same id.
    async fn put_record(&self, table: &TableName, record: &QuizRecord) -> Result<(), StoreError>;
}

/// In-process result store.
///
/// Tables only accept writes once created, mirroring a real database. Call
/// counters let tests assert how often the loader touched the schema.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    tables: Mutex<HashMap<String, HashMap<String, Value>>>,
    exists_calls: AtomicUsize,
    create_calls: AtomicUsize,
    put_calls: AtomicUsize,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the document stored under `id` in `table`.
    pub fn record(&self, table: &str, id: &str) -> Option<Value> {
        self.lock().get(table).and_then(|rows| rows.get(id).cloned())
    }

    /// Returns the number of records in `table`.
    pub fn len(&self, table: &str) -> usize {
        self.lock().get(table).map(HashMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashMap<String, Value>>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn table_exists(&self, table: &TableName) -> Result<bool, StoreError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock().contains_key(table.as_str()))
    }

    async fn create_table(&self, table: &TableName) -> Result<(), StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.lock().entry(table.to_string()).or_default();
        Ok(())
    }

    async fn put_record(&self, table: &TableName, record: &QuizRecord) -> Result<(), StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.lock();
        let rows = tables
            .get_mut(table.as_str())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        rows.insert(record.id.clone(), record.document.clone());
        Ok(())
    }
}
