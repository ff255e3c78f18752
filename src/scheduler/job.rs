//! Job outcomes reported by workers.
//!
//! A job is just a quiz id. Every job a worker finishes produces exactly one
//! [`CompleteJob`]; failed ones are turned into a [`DeadLetter`] by the
//! completion router.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::error::{CombineError, ExtractError, LoadError, QuestionSetError};

/// The terminal steps of a job, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStep {
    LoadQuestions,
    Extract,
    Combine,
    Load,
}

impl JobStep {
    /// Metric label for this step.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStep::LoadQuestions => "load_questions",
            JobStep::Extract => "extract",
            JobStep::Combine => "combine",
            JobStep::Load => "load",
        }
    }
}

impl fmt::Display for JobStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal job failure, tagged with the step that failed.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to load questions from file: {0}")]
    LoadQuestions(#[source] QuestionSetError),

    #[error("failed to extract: {0}")]
    Extract(#[source] ExtractError),

    #[error("failed to merge extracted quiz and questions: {0}")]
    Combine(#[source] CombineError),

    #[error("failed to load: {0}")]
    Load(#[source] LoadError),
}

impl JobError {
    pub fn step(&self) -> JobStep {
        match self {
            JobError::LoadQuestions(_) => JobStep::LoadQuestions,
            JobError::Extract(_) => JobStep::Extract,
            JobError::Combine(_) => JobStep::Combine,
            JobError::Load(_) => JobStep::Load,
        }
    }
}

/// Completion report for one job.
#[derive(Debug)]
pub struct CompleteJob {
    pub quiz_id: String,
    pub worker_num: usize,
    pub processing_time: Duration,
    /// `None` when the job succeeded, cleanup failures included.
    pub error: Option<JobError>,
}

impl CompleteJob {
    pub fn success(quiz_id: impl Into<String>, worker_num: usize, processing_time: Duration) -> Self {
        Self {
            quiz_id: quiz_id.into(),
            worker_num,
            processing_time,
            error: None,
        }
    }

    pub fn failure(
        quiz_id: impl Into<String>,
        worker_num: usize,
        processing_time: Duration,
        error: JobError,
    ) -> Self {
        Self {
            quiz_id: quiz_id.into(),
            worker_num,
            processing_time,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Converts a failed completion into a dead letter. Successful
    /// completions come back unchanged as `Err`.
    pub fn into_dead_letter(self) -> Result<DeadLetter, CompleteJob> {
        match self.error {
            Some(reason) => Ok(DeadLetter {
                quiz_id: self.quiz_id,
                reason,
            }),
            None => Err(self),
        }
    }
}

/// A job that failed terminally and will not be retried.
#[derive(Debug)]
pub struct DeadLetter {
    pub quiz_id: String,
    pub reason: JobError,
}
