//! Loading combined quizzes into the durable store.
//!
//! The loader makes sure the destination table exists before the first
//! write, then upserts the quiz by id. Repeated loads of the same quiz leave
//! only the latest document behind.

pub mod postgres;
pub mod store;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::LoadError;
use crate::quiz::Quiz;

pub use postgres::PgResultStore;
pub use store::{MemoryResultStore, QuizRecord, ResultStore, TableName};

/// Persists complete quizzes.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, quiz: &Quiz) -> Result<(), LoadError>;
}

/// Loads quizzes into one table of a [`ResultStore`].
pub struct TableLoader {
    store: Arc<dyn ResultStore>,
    table: TableName,
    /// Set once the table is known to exist.
    table_ready: OnceCell<()>,
}

impl TableLoader {
    pub fn new(store: Arc<dyn ResultStore>, table: TableName) -> Self {
        Self {
            store,
            table,
            table_ready: OnceCell::new(),
        }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Creates the table unless it is already known to exist.
    ///
    /// Only one caller at a time gets past the cache, so concurrent first
    /// loads issue a single create. An existence check that fails is treated
    /// as "absent". A create that fails still succeeds if the table exists
    /// afterwards.
    async fn ensure_table(&self) -> Result<(), LoadError> {
        self.table_ready
            .get_or_try_init(|| self.create_if_absent())
            .await?;
        Ok(())
    }

    async fn create_if_absent(&self) -> Result<(), LoadError> {
        let exists = match self.store.table_exists(&self.table).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(table = %self.table, error = %e, "Could not determine whether table exists");
                false
            }
        };
        if exists {
            return Ok(());
        }

        info!(table = %self.table, "Result table does not exist, creating it");
        let Err(source) = self.store.create_table(&self.table).await else {
            return Ok(());
        };

        if let Ok(true) = self.store.table_exists(&self.table).await {
            warn!(table = %self.table, error = %source, "Table creation failed but the table exists");
            return Ok(());
        }
        Err(LoadError::CreateTable {
            table: self.table.to_string(),
            source,
        })
    }
}

/// Converts a quiz into its stored form.
pub fn to_record(quiz: &Quiz) -> Result<QuizRecord, LoadError> {
    let document = serde_json::to_value(quiz).map_err(|source| LoadError::Serialize {
        quiz_id: quiz.id.clone(),
        source,
    })?;
    Ok(QuizRecord {
        id: quiz.id.clone(),
        document,
    })
}

#[async_trait]
impl Loader for TableLoader {
    async fn load(&self, quiz: &Quiz) -> Result<(), LoadError> {
        let (ready, record) = tokio::join!(self.ensure_table(), async { to_record(quiz) });
        ready?;
        let record = record?;

        self.store
            .put_record(&self.table, &record)
            .await
            .map_err(|source| LoadError::Put {
                quiz_id: quiz.id.clone(),
                table: self.table.to_string(),
                source,
            })?;

        debug!(quiz_id = %quiz.id, table = %self.table, "Loaded quiz");
        Ok(())
    }
}
