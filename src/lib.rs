//! quiz_result_loader: moves completed quizzes from the live store into a
//! durable result store.
//!
//! A quiz-complete event names a quiz. A worker then loads the quiz's question
//! set, extracts the session from the key-value store, merges the two, upserts
//! the result and finally removes the live data.

// Core modules
pub mod cli;
pub mod combine;
pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod metrics;
pub mod quiz;
pub mod scheduler;
pub mod service;
pub mod subscribe;

// Re-export commonly used error types
pub use error::{CombineError, ExtractError, LoadError, QuestionSetError, SourceError, StoreError};

pub use config::{ConfigError, LoaderConfig};
pub use quiz::Quiz;
