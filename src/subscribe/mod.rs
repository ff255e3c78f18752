//! Intake of quiz-complete events.
//!
//! The subscriber pulls event bodies from a [`MessageSource`], extracts the
//! quiz id and pushes it onto the bounded job queue. A full job queue blocks
//! the subscriber, which throttles intake. Malformed events are logged and
//! dropped.

pub mod redis_list;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::MetricsCollector;

pub use redis_list::RedisListSource;

/// Event type carried in the envelope of published events.
pub const QUIZ_COMPLETE_EVENT_TYPE: &str = "quiz-complete";

/// Errors that can occur while receiving or publishing events.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message source error: {0}")]
    Source(String),

    /// Every worker has gone away.
    #[error("Job queue closed")]
    JobQueueClosed,
}

/// Delivers raw event bodies.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Waits up to `wait` for the next body. `None` means nothing arrived.
    async fn next_message(&self, wait: Duration) -> Result<Option<String>, SubscribeError>;
}

/// `{"type":"quiz-complete","data":{"quizId":"..."}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizCompleteEvent {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub data: QuizCompleteData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizCompleteData {
    #[serde(rename = "quizId", default)]
    pub quiz_id: String,
}

impl QuizCompleteEvent {
    pub fn new(quiz_id: impl Into<String>) -> Self {
        Self {
            event_type: Some(QUIZ_COMPLETE_EVENT_TYPE.to_string()),
            data: QuizCompleteData {
                quiz_id: quiz_id.into(),
            },
        }
    }
}

/// Why an inbound body produced no job.
#[derive(Debug, Error)]
pub enum DropReason {
    #[error("unable to parse event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("empty quizId")]
    EmptyQuizId,
}

impl DropReason {
    /// Metric label for this reason.
    pub fn label(&self) -> &'static str {
        match self {
            DropReason::Malformed(_) => "malformed",
            DropReason::EmptyQuizId => "empty_quiz_id",
        }
    }
}

/// Extracts the quiz id from an event body.
pub fn parse_quiz_id(body: &str) -> Result<String, DropReason> {
    let event: QuizCompleteEvent = serde_json::from_str(body)?;
    if event.data.quiz_id.is_empty() {
        return Err(DropReason::EmptyQuizId);
    }
    Ok(event.data.quiz_id)
}

/// Forwards quiz ids from a message source into the job queue.
pub struct Subscriber {
    source: Arc<dyn MessageSource>,
    poll_interval: Duration,
    metrics: MetricsCollector,
}

impl Subscriber {
    pub fn new(source: Arc<dyn MessageSource>) -> Self {
        Self {
            source,
            poll_interval: Duration::from_secs(1),
            metrics: MetricsCollector::new(),
        }
    }

    /// Sets how long one receive waits and how long to back off after a
    /// transport error.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs until cancelled, which returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns `SubscribeError::JobQueueClosed` if the job queue has no
    /// receivers left.
    pub async fn run(
        &self,
        jobs: flume::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<(), SubscribeError> {
        info!("Subscriber started");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = self.source.next_message(self.poll_interval) => next,
            };

            let body = match next {
                Ok(Some(body)) => body,
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, "Failed to receive event, retrying");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => continue,
                    }
                }
            };

            let quiz_id = match parse_quiz_id(&body) {
                Ok(quiz_id) => quiz_id,
                Err(reason) => {
                    warn!(body = %body, error = %reason, "Dropping quiz-complete event");
                    self.metrics.record_dropped_event(reason.label());
                    continue;
                }
            };

            debug!(quiz_id = %quiz_id, "Received quiz-complete event");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = jobs.send_async(quiz_id) => {
                    if sent.is_err() {
                        return Err(SubscribeError::JobQueueClosed);
                    }
                }
            }
        }

        info!("Subscriber stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays scripted deliveries, then reports an empty poll forever.
    struct ScriptedSource {
        deliveries: Mutex<VecDeque<Result<Option<String>, SubscribeError>>>,
    }

    impl ScriptedSource {
        fn new(deliveries: Vec<Result<Option<String>, SubscribeError>>) -> Self {
            Self {
                deliveries: Mutex::new(deliveries.into()),
            }
        }
    }

    #[async_trait]
    impl MessageSource for ScriptedSource {
        async fn next_message(&self, wait: Duration) -> Result<Option<String>, SubscribeError> {
            let next = self.deliveries.lock().unwrap().pop_front();
            match next {
                Some(delivery) => delivery,
                None => {
                    tokio::time::sleep(wait).await;
                    Ok(None)
                }
            }
        }
    }

    fn body(quiz_id: &str) -> Result<Option<String>, SubscribeError> {
        Ok(Some(format!(r#"{{"data":{{"quizId":"{}"}}}}"#, quiz_id)))
    }

    #[test]
    fn test_parse_quiz_id() {
        assert_eq!(parse_quiz_id(r#"{"data":{"quizId":"q1"}}"#).unwrap(), "q1");
        assert_eq!(
            parse_quiz_id(r#"{"type":"quiz-complete","data":{"quizId":"q2"}}"#).unwrap(),
            "q2"
        );
        assert!(matches!(
            parse_quiz_id(r#"{"data":{"quizId":""}}"#),
            Err(DropReason::EmptyQuizId)
        ));
        assert!(matches!(
            parse_quiz_id(r#"{"data":{}}"#),
            Err(DropReason::EmptyQuizId)
        ));
        assert!(matches!(
            parse_quiz_id("not json"),
            Err(DropReason::Malformed(_))
        ));
    }

    #[test]
    fn test_published_envelope_parses() {
        let encoded = serde_json::to_string(&QuizCompleteEvent::new("quiz9")).unwrap();
        assert!(encoded.contains(r#""type":"quiz-complete""#));
        assert_eq!(parse_quiz_id(&encoded).unwrap(), "quiz9");
    }

    #[tokio::test]
    async fn test_subscriber_forwards_and_drops() {
        let source = Arc::new(ScriptedSource::new(vec![
            body("quiz1"),
            Ok(Some("{not json".to_string())),
            Ok(None),
            body(""),
            Err(SubscribeError::Source("connection reset".to_string())),
            body("quiz2"),
        ]));
        let subscriber = Subscriber::new(source).with_poll_interval(Duration::from_millis(5));
        let (job_tx, job_rx) = flume::bounded(10);
        let cancel = CancellationToken::new();

        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { subscriber.run(job_tx, cancel).await }
        });

        assert_eq!(job_rx.recv_async().await.unwrap(), "quiz1");
        assert_eq!(job_rx.recv_async().await.unwrap(), "quiz2");

        cancel.cancel();
        run.await.unwrap().expect("cancellation is a clean exit");
        assert!(job_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscriber_blocks_on_full_queue_until_cancelled() {
        let source = Arc::new(ScriptedSource::new(vec![body("quiz1"), body("quiz2")]));
        let subscriber = Subscriber::new(source).with_poll_interval(Duration::from_millis(5));
        let (job_tx, job_rx) = flume::bounded(1);
        let cancel = CancellationToken::new();

        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { subscriber.run(job_tx, cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(job_rx.len(), 1);

        cancel.cancel();
        run.await.unwrap().expect("clean exit while blocked");
    }

    #[tokio::test]
    async fn test_subscriber_reports_closed_queue() {
        let source = Arc::new(ScriptedSource::new(vec![body("quiz1")]));
        let subscriber = Subscriber::new(source);
        let (job_tx, job_rx) = flume::bounded::<String>(1);
        drop(job_rx);

        let err = subscriber
            .run(job_tx, CancellationToken::new())
            .await
            .expect_err("no receivers left");
        assert!(matches!(err, SubscribeError::JobQueueClosed));
    }
}
