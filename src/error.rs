//! Error types for quiz-result-loader operations.
//!
//! Defines the error types for each stage of the result pipeline:
//! - Key-value source access
//! - Extraction of live quiz session data
//! - Combining extracted quizzes with question sets
//! - Question set file access
//! - Durable result storage

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by a key-value source binding.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Key-value backend error: {0}")]
    Backend(String),
}

/// Errors that can occur while extracting a quiz from the key-value source.
///
/// Every variant that concerns a stored value names both the logical
/// attribute and the key it was read from.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to load {attribute} from key '{key}'")]
    MissingKey { attribute: &'static str, key: String },

    #[error("failed to load {attribute} from key '{key}': {source}")]
    Source {
        attribute: &'static str,
        key: String,
        #[source]
        source: SourceError,
    },

    #[error("failed to parse {attribute} from key '{key}': {reason}")]
    Malformed {
        attribute: &'static str,
        key: String,
        reason: String,
    },

    #[error("quiz '{quiz_id}' has a stop time earlier than its start time")]
    InvalidTimes { quiz_id: String },

    #[error("context deadline exceeded: extraction did not finish within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("extraction cancelled")]
    Cancelled,
}

/// Errors that can occur while combining an extracted quiz with its questions.
#[derive(Debug, Error)]
pub enum CombineError {
    #[error("expected question from extracted quiz to be an index, got '{0}'")]
    NotAnIndex(String),

    #[error("question index {index} is out of range for a question set of {available} questions")]
    IndexOutOfRange { index: usize, available: usize },
}

/// Errors that can occur while reading or removing question set files.
#[derive(Debug, Error)]
pub enum QuestionSetError {
    #[error("invalid quiz id '{0}' for a question set path")]
    InvalidQuizId(String),

    #[error("failed to read question set '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to deserialize question set '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to delete question set '{}': {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by a durable result store binding.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    #[error("Invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors that can occur while loading a combined quiz into the durable store.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to create table '{table}': {source}")]
    CreateTable {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to serialize quiz '{quiz_id}': {source}")]
    Serialize {
        quiz_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to put quiz '{quiz_id}' into table '{table}': {source}")]
    Put {
        quiz_id: String,
        table: String,
        #[source]
        source: StoreError,
    },
}
