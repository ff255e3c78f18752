//! Stub collaborators for scheduler tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use tokio_util::sync::CancellationToken;

use crate::error::{ExtractError, LoadError, QuestionSetError, StoreError};
use crate::extract::Extractor;
use crate::load::Loader;
use crate::quiz::{QuestionDefinition, QuestionSetStore, QuestionSummary, Quiz};

pub(crate) fn sample_quiz(quiz_id: &str, placeholders: &[&str]) -> Quiz {
    let start = DateTime::from_timestamp(1_643_273_678, 0).expect("valid timestamp");
    Quiz {
        id: quiz_id.to_string(),
        name: "example".to_string(),
        question_duration: Duration::from_secs(10),
        start_time: start,
        stop_time: start,
        questions: placeholders
            .iter()
            .map(|p| QuestionSummary {
                question: p.to_string(),
                ..QuestionSummary::default()
            })
            .collect(),
        participants: Vec::new(),
    }
}

pub(crate) struct StubQuestionSets {
    count: Option<usize>,
    fail_delete: bool,
    pub deletes: AtomicUsize,
}

impl StubQuestionSets {
    pub fn ok(count: usize) -> Self {
        Self {
            count: Some(count),
            fail_delete: false,
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn missing() -> Self {
        Self {
            count: None,
            ..Self::ok(0)
        }
    }

    pub fn failing_delete(count: usize) -> Self {
        Self {
            fail_delete: true,
            ..Self::ok(count)
        }
    }
}

#[async_trait]
impl QuestionSetStore for StubQuestionSets {
    async fn load(&self, quiz_id: &str) -> Result<Vec<QuestionDefinition>, QuestionSetError> {
        let count = self.count.ok_or_else(|| QuestionSetError::Read {
            path: format!("{}.json", quiz_id).into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        })?;
        Ok((0..count)
            .map(|i| QuestionDefinition {
                question: format!("question {}", i),
                category: "Food".to_string(),
                options: vec!["a".to_string(), "b".to_string()],
                answers: vec![0],
            })
            .collect())
    }

    async fn delete(&self, quiz_id: &str) -> Result<(), QuestionSetError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete {
            return Err(QuestionSetError::Delete {
                path: format!("{}.json", quiz_id).into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        Ok(())
    }
}

pub(crate) enum ExtractMode {
    Ok,
    Fail,
    NotAnIndex,
    Stalled(Duration),
}

pub(crate) struct StubExtractor {
    mode: ExtractMode,
    fail_delete: bool,
    pub deletes: AtomicUsize,
}

impl StubExtractor {
    pub fn new(mode: ExtractMode) -> Self {
        Self {
            mode,
            fail_delete: false,
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn ok() -> Self {
        Self::new(ExtractMode::Ok)
    }

    pub fn stalled(stall: Duration) -> Self {
        Self::new(ExtractMode::Stalled(stall))
    }

    pub fn failing_delete() -> Self {
        Self {
            fail_delete: true,
            ..Self::ok()
        }
    }
}

#[async_trait]
impl Extractor for StubExtractor {
    async fn extract(&self, quiz_id: &str, _cancel: &CancellationToken) -> Result<Quiz, ExtractError> {
        match self.mode {
            ExtractMode::Ok => Ok(sample_quiz(quiz_id, &["0", "1"])),
            ExtractMode::Fail => Err(ExtractError::MissingKey {
                attribute: "quiz name",
                key: format!("{}:quizName", quiz_id),
            }),
            ExtractMode::NotAnIndex => Ok(sample_quiz(quiz_id, &["first"])),
            ExtractMode::Stalled(stall) => {
                tokio::time::sleep(stall).await;
                Ok(sample_quiz(quiz_id, &[]))
            }
        }
    }

    async fn delete(&self, quiz_id: &str) -> Result<(), ExtractError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete {
            return Err(ExtractError::MissingKey {
                attribute: "quiz keys",
                key: format!("{}:*", quiz_id),
            });
        }
        Ok(())
    }
}

pub(crate) struct StubLoader {
    fail: bool,
    pub loaded: Mutex<Vec<Quiz>>,
}

impl StubLoader {
    pub fn ok() -> Self {
        Self {
            fail: false,
            loaded: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::ok()
        }
    }
}

#[async_trait]
impl Loader for StubLoader {
    async fn load(&self, quiz: &Quiz) -> Result<(), LoadError> {
        if self.fail {
            return Err(LoadError::Put {
                quiz_id: quiz.id.clone(),
                table: "quiz".to_string(),
                source: StoreError::Backend("write throttled".to_string()),
            });
        }
        self.loaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(quiz.clone());
        Ok(())
    }
}
