//! Completion routing and the dead-letter sink.
//!
//! The router consumes every [`CompleteJob`]: successes are logged with their
//! timing, failures become [`DeadLetter`]s for the sink. Both loops end when
//! their input channel closes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::job::{CompleteJob, DeadLetter};
use crate::metrics::MetricsCollector;

/// Terminal destination for jobs that failed.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn accept(&self, letter: DeadLetter);
}

/// Records dead letters as log lines.
#[derive(Debug, Clone, Default)]
pub struct LogDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LogDeadLetterSink {
    async fn accept(&self, letter: DeadLetter) {
        error!(
            quiz_id = %letter.quiz_id,
            step = %letter.reason.step(),
            reason = %letter.reason,
            "Failed to process quiz"
        );
    }
}

/// Routes completions until every worker has dropped its sender.
///
/// Returns the number of dead letters routed.
pub async fn route_completions(
    mut completions: mpsc::Receiver<CompleteJob>,
    dead_letters: mpsc::Sender<DeadLetter>,
) -> usize {
    let metrics = MetricsCollector::new();
    let mut routed = 0;

    while let Some(completion) = completions.recv().await {
        match completion.into_dead_letter() {
            Err(done) => {
                info!(
                    worker = done.worker_num,
                    quiz_id = %done.quiz_id,
                    duration_ms = done.processing_time.as_millis() as u64,
                    "Worker finished processing quiz"
                );
            }
            Ok(letter) => {
                metrics.record_dead_letter(letter.reason.step().as_str());
                routed += 1;
                if let Err(mpsc::error::SendError(letter)) = dead_letters.send(letter).await {
                    warn!(
                        quiz_id = %letter.quiz_id,
                        reason = %letter.reason,
                        "Dead-letter sink is gone, dropping dead letter"
                    );
                }
            }
        }
    }

    routed
}

/// Feeds dead letters to `sink` until the channel closes.
///
/// Returns the number of dead letters accepted.
pub async fn run_dead_letter_sink(
    mut dead_letters: mpsc::Receiver<DeadLetter>,
    sink: Arc<dyn DeadLetterSink>,
) -> usize {
    let mut accepted = 0;
    while let Some(letter) = dead_letters.recv().await {
        sink.accept(letter).await;
        accepted += 1;
    }
    accepted
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::error::{CombineError, LoadError, StoreError};
    use crate::scheduler::job::{JobError, JobStep};

    #[derive(Default)]
    struct RecordingSink {
        letters: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl DeadLetterSink for RecordingSink {
        async fn accept(&self, letter: DeadLetter) {
            self.letters
                .lock()
                .unwrap()
                .push((letter.quiz_id, letter.reason.to_string()));
        }
    }

    #[tokio::test]
    async fn test_router_sends_only_failures() {
        let (done_tx, done_rx) = mpsc::channel(4);
        let (dead_tx, dead_rx) = mpsc::channel(4);
        let sink = Arc::new(RecordingSink::default());

        let router = tokio::spawn(route_completions(done_rx, dead_tx));
        let sink_task = tokio::spawn(run_dead_letter_sink(dead_rx, sink.clone()));

        done_tx
            .send(CompleteJob::success("quiz1", 0, Duration::from_millis(12)))
            .await
            .unwrap();
        done_tx
            .send(CompleteJob::failure(
                "quiz2",
                1,
                Duration::from_millis(3),
                JobError::Combine(CombineError::NotAnIndex("x".to_string())),
            ))
            .await
            .unwrap();
        done_tx
            .send(CompleteJob::failure(
                "quiz3",
                1,
                Duration::from_millis(3),
                JobError::Load(LoadError::Put {
                    quiz_id: "quiz3".to_string(),
                    table: "quiz".to_string(),
                    source: StoreError::Backend("down".to_string()),
                }),
            ))
            .await
            .unwrap();
        drop(done_tx);

        assert_eq!(router.await.unwrap(), 2);
        assert_eq!(sink_task.await.unwrap(), 2);

        let letters = sink.letters.lock().unwrap();
        assert_eq!(letters[0].0, "quiz2");
        assert!(letters[0]
            .1
            .starts_with("failed to merge extracted quiz and questions"));
        assert_eq!(letters[1].0, "quiz3");
        assert!(letters[1].1.starts_with("failed to load: "));
    }

    #[tokio::test]
    async fn test_router_survives_closed_sink() {
        let (done_tx, done_rx) = mpsc::channel(1);
        let (dead_tx, dead_rx) = mpsc::channel(1);
        drop(dead_rx);

        let router = tokio::spawn(route_completions(done_rx, dead_tx));
        done_tx
            .send(CompleteJob::failure(
                "quiz1",
                0,
                Duration::ZERO,
                JobError::Combine(CombineError::IndexOutOfRange {
                    index: 9,
                    available: 2,
                }),
            ))
            .await
            .unwrap();
        drop(done_tx);

        assert_eq!(router.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_log_sink_accepts() {
        let letter = DeadLetter {
            quiz_id: "quiz1".to_string(),
            reason: JobError::Combine(CombineError::NotAnIndex("x".to_string())),
        };
        assert_eq!(letter.reason.step(), JobStep::Combine);
        LogDeadLetterSink.accept(letter).await;
    }
}
