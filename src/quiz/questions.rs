//! Static question set definitions and their file-backed store.
//!
//! Question sets are uploaded as a JSON array per quiz and live at
//! `<base>/<quizId>.json` until the quiz's results have been loaded.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::QuestionSetError;

/// One entry of a question set file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDefinition {
    pub question: String,
    pub category: String,
    pub options: Vec<String>,
    /// Indexes into `options` that are correct.
    pub answers: Vec<u32>,
}

/// Parses the contents of a question set file.
pub fn parse_question_set(bytes: &[u8]) -> Result<Vec<QuestionDefinition>, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Source of question definitions for a quiz.
#[async_trait]
pub trait QuestionSetStore: Send + Sync {
    /// Loads the ordered question definitions for `quiz_id`.
    async fn load(&self, quiz_id: &str) -> Result<Vec<QuestionDefinition>, QuestionSetError>;

    /// Removes the question definitions for `quiz_id`.
    async fn delete(&self, quiz_id: &str) -> Result<(), QuestionSetError>;
}

/// Question sets stored as `<base>/<quizId>.json` files.
#[derive(Debug, Clone)]
pub struct FileQuestionSets {
    base_path: PathBuf,
}

impl FileQuestionSets {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Returns the file path for a quiz's question set.
    ///
    /// Quiz ids arrive from the message queue, so anything that could step
    /// outside the base directory is rejected.
    pub fn path_for(&self, quiz_id: &str) -> Result<PathBuf, QuestionSetError> {
        let invalid = quiz_id.is_empty()
            || quiz_id.contains('/')
            || quiz_id.contains('\\')
            || quiz_id.contains("..")
            || quiz_id.contains('\0');
        if invalid {
            return Err(QuestionSetError::InvalidQuizId(quiz_id.to_string()));
        }
        Ok(self.base_path.join(format!("{}.json", quiz_id)))
    }
}

#[async_trait]
impl QuestionSetStore for FileQuestionSets {
    async fn load(&self, quiz_id: &str) -> Result<Vec<QuestionDefinition>, QuestionSetError> {
        let path = self.path_for(quiz_id)?;
        let bytes = fs::read(&path)
            .await
            .map_err(|source| QuestionSetError::Read {
                path: path.clone(),
                source,
            })?;
        parse_question_set(&bytes).map_err(|source| QuestionSetError::Parse { path, source })
    }

    async fn delete(&self, quiz_id: &str) -> Result<(), QuestionSetError> {
        let path = self.path_for(quiz_id)?;
        fs::remove_file(&path)
            .await
            .map_err(|source| QuestionSetError::Delete { path, source })
    }
}
