//! Service configuration.
//!
//! Every setting has a default and can be overridden through an environment
//! variable. The resulting [`LoaderConfig`] is handed explicitly to the
//! components that need it.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::load::TableName;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the result loader service.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    // Connections
    /// Redis URL for both the live quiz data and the event list.
    pub redis_url: String,
    /// Redis list carrying quiz-complete events.
    pub event_queue: String,
    /// PostgreSQL connection URL of the result store.
    pub database_url: String,
    /// Table holding combined quiz results.
    pub result_table: String,
    /// Directory containing `<quizId>.json` question sets.
    pub question_set_path: PathBuf,

    // Concurrency
    /// Number of workers in the pool.
    pub worker_count: usize,
    /// Capacity of the job queue between subscriber and workers.
    pub job_queue_capacity: usize,
    /// Capacity of the completion and dead-letter channels.
    pub report_queue_capacity: usize,

    // Timing
    /// Bound on a single extraction.
    pub extract_deadline: Duration,
    /// How long one event receive waits.
    pub poll_interval: Duration,
    /// How long shutdown waits for workers.
    pub shutdown_timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            event_queue: "quiz-complete".to_string(),
            database_url: "postgres://localhost/quiz_results".to_string(),
            result_table: "quiz".to_string(),
            question_set_path: PathBuf::from("./question-sets"),

            worker_count: 10,
            job_queue_capacity: 10,
            report_queue_capacity: 10,

            extract_deadline: Duration::from_millis(1000),
            poll_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl LoaderConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: Redis URL (default: redis://localhost:6379)
    /// - `EVENT_QUEUE`: Event list name (default: quiz-complete)
    /// - `DATABASE_URL`: PostgreSQL URL (default: postgres://localhost/quiz_results)
    /// - `RESULT_TABLE`: Result table (default: quiz)
    /// - `QUESTION_SET_PATH`: Question set directory (default: ./question-sets)
    /// - `WORKER_COUNT`: Number of workers (default: 10)
    /// - `JOB_QUEUE_CAPACITY`: Job queue capacity (default: 10)
    /// - `REPORT_QUEUE_CAPACITY`: Completion channel capacity (default: 10)
    /// - `EXTRACT_DEADLINE_MS`: Extraction deadline in milliseconds (default: 1000)
    /// - `POLL_INTERVAL_SECS`: Event poll interval in seconds (default: 1)
    /// - `SHUTDOWN_TIMEOUT_SECS`: Shutdown timeout in seconds (default: 30)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from any key lookup, applying the same rules as
    /// [`LoaderConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("REDIS_URL") {
            config.redis_url = val;
        }
        if let Some(val) = lookup("EVENT_QUEUE") {
            config.event_queue = val;
        }
        if let Some(val) = lookup("DATABASE_URL") {
            config.database_url = val;
        }
        if let Some(val) = lookup("RESULT_TABLE") {
            config.result_table = val;
        }
        if let Some(val) = lookup("QUESTION_SET_PATH") {
            config.question_set_path = PathBuf::from(val);
        }

        if let Some(val) = lookup("WORKER_COUNT") {
            config.worker_count = parse_env_value(&val, "WORKER_COUNT")?;
        }
        if let Some(val) = lookup("JOB_QUEUE_CAPACITY") {
            config.job_queue_capacity = parse_env_value(&val, "JOB_QUEUE_CAPACITY")?;
        }
        if let Some(val) = lookup("REPORT_QUEUE_CAPACITY") {
            config.report_queue_capacity = parse_env_value(&val, "REPORT_QUEUE_CAPACITY")?;
        }

        if let Some(val) = lookup("EXTRACT_DEADLINE_MS") {
            let millis: u64 = parse_env_value(&val, "EXTRACT_DEADLINE_MS")?;
            config.extract_deadline = Duration::from_millis(millis);
        }
        if let Some(val) = lookup("POLL_INTERVAL_SECS") {
            let secs: u64 = parse_env_value(&val, "POLL_INTERVAL_SECS")?;
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(val) = lookup("SHUTDOWN_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "SHUTDOWN_TIMEOUT_SECS")?;
            config.shutdown_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "redis_url cannot be empty".to_string(),
            ));
        }

        if self.event_queue.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "event_queue cannot be empty".to_string(),
            ));
        }

        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        if TableName::parse(&self.result_table).is_err() {
            return Err(ConfigError::ValidationFailed(format!(
                "result_table '{}' must be a plain SQL identifier",
                self.result_table
            )));
        }

        if self.question_set_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "question_set_path cannot be empty".to_string(),
            ));
        }

        if self.worker_count == 0 {
            return Err(ConfigError::ValidationFailed(
                "worker_count must be greater than 0".to_string(),
            ));
        }

        if self.job_queue_capacity == 0 || self.report_queue_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "queue capacities must be greater than 0".to_string(),
            ));
        }

        if self.extract_deadline.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "extract_deadline must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the validated result table name.
    pub fn table_name(&self) -> Result<TableName, ConfigError> {
        TableName::parse(&self.result_table).map_err(|e| ConfigError::InvalidValue {
            key: "RESULT_TABLE".to_string(),
            message: e.to_string(),
        })
    }

    /// Builder method to set the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Builder method to set the event list name.
    pub fn with_event_queue(mut self, queue: impl Into<String>) -> Self {
        self.event_queue = queue.into();
        self
    }

    /// Builder method to set the database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Builder method to set the result table.
    pub fn with_result_table(mut self, table: impl Into<String>) -> Self {
        self.result_table = table.into();
        self
    }

    /// Builder method to set the question set directory.
    pub fn with_question_set_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.question_set_path = path.into();
        self
    }

    /// Builder method to set the number of workers.
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Builder method to set the extraction deadline.
    pub fn with_extract_deadline(mut self, deadline: Duration) -> Self {
        self.extract_deadline = deadline;
        self
    }

    /// Builder method to set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builder method to set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Parse an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
