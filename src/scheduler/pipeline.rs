//! The per-job step sequence: load questions, extract, combine, load, clean up.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::job::JobError;
use crate::combine::combine;
use crate::extract::Extractor;
use crate::load::Loader;
use crate::metrics::MetricsCollector;
use crate::quiz::{QuestionSetStore, Quiz};

/// Runs the steps of one job against shared collaborators.
///
/// The collaborators are shared read-only by every worker.
#[derive(Clone)]
pub struct JobPipeline {
    question_sets: Arc<dyn QuestionSetStore>,
    extractor: Arc<dyn Extractor>,
    loader: Arc<dyn Loader>,
    metrics: MetricsCollector,
}

impl JobPipeline {
    pub fn new(
        question_sets: Arc<dyn QuestionSetStore>,
        extractor: Arc<dyn Extractor>,
        loader: Arc<dyn Loader>,
    ) -> Self {
        Self {
            question_sets,
            extractor,
            loader,
            metrics: MetricsCollector::new(),
        }
    }

    /// Runs steps 1 to 4 and returns the quiz as it was stored.
    pub async fn execute(&self, quiz_id: &str, cancel: &CancellationToken) -> Result<Quiz, JobError> {
        let questions = self
            .question_sets
            .load(quiz_id)
            .await
            .map_err(JobError::LoadQuestions)?;
        debug!(quiz_id = %quiz_id, questions = questions.len(), "Loaded question set");

        // Questions are still placeholders at this point
        let extracted = self
            .extractor
            .extract(quiz_id, cancel)
            .await
            .map_err(JobError::Extract)?;

        let quiz = combine(extracted, &questions).map_err(JobError::Combine)?;

        self.loader.load(&quiz).await.map_err(JobError::Load)?;
        Ok(quiz)
    }

    /// Removes the quiz's transient data. Failures are logged, never returned.
    pub async fn cleanup(&self, quiz_id: &str) {
        if let Err(e) = self.extractor.delete(quiz_id).await {
            warn!(quiz_id = %quiz_id, error = %e, "Failed to delete extracted quiz");
            self.metrics.record_cleanup_failure("source");
        }

        if let Err(e) = self.question_sets.delete(quiz_id).await {
            warn!(quiz_id = %quiz_id, error = %e, "Failed to delete questions file");
            self.metrics.record_cleanup_failure("question_set");
        }
    }

    /// Runs the whole job. A job whose result was stored succeeds even if
    /// cleanup fails.
    pub async fn process(&self, quiz_id: &str, cancel: &CancellationToken) -> Result<(), JobError> {
        self.execute(quiz_id, cancel).await?;
        self.cleanup(quiz_id).await;
        Ok(())
    }
}
