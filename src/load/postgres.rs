//! PostgreSQL result store.
//!
//! Each quiz is one row: the quiz id as primary key and the combined quiz as
//! a JSONB document.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};

use super::store::{QuizRecord, ResultStore, TableName};
use crate::error::StoreError;

/// PostgreSQL-backed [`ResultStore`].
#[derive(Clone)]
pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    /// Connects to the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn table_exists(&self, table: &TableName) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(table.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn create_table(&self, table: &TableName) -> Result<(), StoreError> {
        // Identifiers cannot be bound, TableName guarantees a safe name
        let statement = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                document JSONB NOT NULL,
                loaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            table
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn put_record(&self, table: &TableName, record: &QuizRecord) -> Result<(), StoreError> {
        let statement = format!(
            r#"
            INSERT INTO {} (id, document, loaded_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (id) DO UPDATE SET
                document = EXCLUDED.document,
                loaded_at = NOW()
            "#,
            table
        );
        sqlx::query(&statement)
            .bind(&record.id)
            .bind(&record.document)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
