//! Extraction of live quiz session data.
//!
//! The extractor reads everything a finished quiz left in the key-value store
//! and assembles a partial [`Quiz`] whose questions are still identified by
//! their position in the question set.

pub mod extractor;
pub mod keys;
pub mod source;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ExtractError;
use crate::quiz::Quiz;

pub use extractor::{KeyValueExtractor, DEFAULT_EXTRACT_DEADLINE};
pub use source::{KeyValueSource, MemorySource, RedisSource};

/// Reads and removes a quiz's live session data.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extracts the partial quiz for `quiz_id`.
    ///
    /// Either every read succeeds within the deadline or an error is
    /// returned; no partially populated quiz ever escapes.
    async fn extract(&self, quiz_id: &str, cancel: &CancellationToken) -> Result<Quiz, ExtractError>;

    /// Deletes every key belonging to `quiz_id`. Not atomic.
    async fn delete(&self, quiz_id: &str) -> Result<(), ExtractError>;
}
