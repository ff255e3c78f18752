//! Parallel extraction of a quiz from a key-value source.
//!
//! All independent reads run concurrently. The leaderboard gates two further
//! fan-outs: per-participant reads (name and stop time) and per-question,
//! per-participant answer reads. The first failing read aborts every other
//! in-flight read, and the whole extraction is bounded by a deadline.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::keys::{self, answer_key, quiz_key, quiz_prefix, user_key};
use super::source::KeyValueSource;
use super::Extractor;
use crate::error::ExtractError;
use crate::quiz::{Answerer, Participant, QuestionSummary, Quiz};

/// Default bound on a single extraction, measured from entry.
pub const DEFAULT_EXTRACT_DEADLINE: Duration = Duration::from_secs(1);

/// Stored form of one participant's answer, e.g.
/// `{"selectedOptionIndexes":[1],"answeredInDuration":8}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerBlob {
    #[serde(default)]
    selected_option_indexes: Vec<u32>,
    /// Whole seconds.
    #[serde(default)]
    answered_in_duration: u64,
}

/// Extracts quizzes from any [`KeyValueSource`].
#[derive(Clone)]
pub struct KeyValueExtractor {
    source: Arc<dyn KeyValueSource>,
    deadline: Duration,
}

impl KeyValueExtractor {
    pub fn new(source: Arc<dyn KeyValueSource>) -> Self {
        Self {
            source,
            deadline: DEFAULT_EXTRACT_DEADLINE,
        }
    }

    /// Sets the extraction deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    async fn gather(&self, quiz_id: &str) -> Result<Quiz, ExtractError> {
        // Everything below the leaderboard waits for it
        let dependents = async {
            let (leaderboard, indexes) = tokio::try_join!(
                self.leaderboard(quiz_id),
                self.selected_question_indexes(quiz_id)
            )?;
            let fanned_out = tokio::try_join!(
                self.participants(quiz_id, &leaderboard),
                self.questions(quiz_id, &leaderboard, &indexes)
            )?;
            Ok::<_, ExtractError>(fanned_out)
        };

        let (name, question_duration, (start_time, stop_time), (participants, questions)) = tokio::try_join!(
            self.quiz_name(quiz_id),
            self.question_duration(quiz_id),
            self.quiz_times(quiz_id),
            dependents
        )?;

        if stop_time < start_time {
            return Err(ExtractError::InvalidTimes {
                quiz_id: quiz_id.to_string(),
            });
        }

        Ok(Quiz {
            id: quiz_id.to_string(),
            name,
            question_duration,
            start_time,
            stop_time,
            questions,
            participants,
        })
    }

    async fn read_string(&self, key: &str, attribute: &'static str) -> Result<String, ExtractError> {
        match self.source.get(key).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(ExtractError::MissingKey {
                attribute,
                key: key.to_string(),
            }),
            Err(source) => Err(ExtractError::Source {
                attribute,
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn read_epoch(
        &self,
        key: &str,
        attribute: &'static str,
    ) -> Result<DateTime<Utc>, ExtractError> {
        let raw = self.read_string(key, attribute).await?;
        parse_epoch_secs(&raw).ok_or_else(|| ExtractError::Malformed {
            attribute,
            key: key.to_string(),
            reason: format!("'{}' is not a non-negative unix timestamp in seconds", raw),
        })
    }

    async fn quiz_name(&self, quiz_id: &str) -> Result<String, ExtractError> {
        self.read_string(&quiz_key(quiz_id, keys::QUIZ_NAME), "quiz name")
            .await
    }

    async fn question_duration(&self, quiz_id: &str) -> Result<Duration, ExtractError> {
        let key = quiz_key(quiz_id, keys::QUESTION_DURATION);
        let raw = self.read_string(&key, "question duration").await?;
        raw.trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ExtractError::Malformed {
                attribute: "question duration",
                key,
                reason: e.to_string(),
            })
    }

    /// Start and stop time live under sibling keys and are read together.
    async fn quiz_times(
        &self,
        quiz_id: &str,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), ExtractError> {
        let start_key = quiz_key(quiz_id, keys::START_TIME);
        let stop_key = quiz_key(quiz_id, keys::STOP_TIME);
        tokio::try_join!(
            self.read_epoch(&start_key, "quiz start time"),
            self.read_epoch(&stop_key, "quiz stop time")
        )
    }

    /// Scores keyed by user id. The map's ordering fixes participant order.
    async fn leaderboard(&self, quiz_id: &str) -> Result<BTreeMap<String, i64>, ExtractError> {
        let key = quiz_key(quiz_id, keys::LEADERBOARD);
        let members = self
            .source
            .sorted_set_with_scores(&key)
            .await
            .map_err(|source| ExtractError::Source {
                attribute: "leaderboard",
                key: key.clone(),
                source,
            })?;

        let mut leaderboard = BTreeMap::new();
        for (user_id, score) in members {
            if !score.is_finite() || score < 0.0 {
                return Err(ExtractError::Malformed {
                    attribute: "leaderboard",
                    key,
                    reason: format!("score {} for '{}' is not a non-negative number", score, user_id),
                });
            }
            leaderboard.insert(user_id, score as i64);
        }
        Ok(leaderboard)
    }

    async fn selected_question_indexes(&self, quiz_id: &str) -> Result<Vec<usize>, ExtractError> {
        let key = quiz_key(quiz_id, keys::SELECTED_QUESTION_INDEXES);
        let raw = self
            .source
            .list_range(&key)
            .await
            .map_err(|source| ExtractError::Source {
                attribute: "selected question indexes",
                key: key.clone(),
                source,
            })?;

        raw.iter()
            .map(|item| {
                item.trim()
                    .parse::<usize>()
                    .map_err(|_| ExtractError::Malformed {
                        attribute: "selected question indexes",
                        key: key.clone(),
                        reason: format!("'{}' is not a question index", item),
                    })
            })
            .collect()
    }

    async fn participants(
        &self,
        quiz_id: &str,
        leaderboard: &BTreeMap<String, i64>,
    ) -> Result<Vec<Participant>, ExtractError> {
        try_join_all(
            leaderboard
                .iter()
                .map(|(user_id, score)| self.participant(quiz_id, user_id, *score)),
        )
        .await
    }

    async fn participant(
        &self,
        quiz_id: &str,
        user_id: &str,
        score: i64,
    ) -> Result<Participant, ExtractError> {
        let name_key = user_key(quiz_id, user_id, keys::USERNAME);
        let stop_key = user_key(quiz_id, user_id, keys::STOP_TIME);
        let (name, stop_time) = tokio::try_join!(
            self.read_string(&name_key, "username"),
            self.read_epoch(&stop_key, "user stop time")
        )?;

        Ok(Participant {
            user_id: user_id.to_string(),
            name,
            score,
            stop_time,
        })
    }

    /// Summaries come back in `indexes` order regardless of which read
    /// finishes first.
    async fn questions(
        &self,
        quiz_id: &str,
        leaderboard: &BTreeMap<String, i64>,
        indexes: &[usize],
    ) -> Result<Vec<QuestionSummary>, ExtractError> {
        try_join_all(
            indexes
                .iter()
                .map(|&index| self.question(quiz_id, leaderboard, index)),
        )
        .await
    }

    async fn question(
        &self,
        quiz_id: &str,
        leaderboard: &BTreeMap<String, i64>,
        index: usize,
    ) -> Result<QuestionSummary, ExtractError> {
        let answers = try_join_all(
            leaderboard
                .keys()
                .map(|user_id| self.answer(quiz_id, user_id, index)),
        )
        .await?;
        Ok(QuestionSummary::placeholder(index, answers))
    }

    async fn answer(
        &self,
        quiz_id: &str,
        user_id: &str,
        index: usize,
    ) -> Result<Answerer, ExtractError> {
        let key = answer_key(quiz_id, user_id, index);
        let raw = self.read_string(&key, "question answer").await?;
        let blob: AnswerBlob =
            serde_json::from_str(&raw).map_err(|e| ExtractError::Malformed {
                attribute: "question answer",
                key,
                reason: e.to_string(),
            })?;

        Ok(Answerer {
            user_id: user_id.to_string(),
            participant_options: blob.selected_option_indexes,
            answered_in_duration: Duration::from_secs(blob.answered_in_duration),
        })
    }
}

#[async_trait]
impl Extractor for KeyValueExtractor {
    async fn extract(&self, quiz_id: &str, cancel: &CancellationToken) -> Result<Quiz, ExtractError> {
        let quiz = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExtractError::Cancelled),
            gathered = tokio::time::timeout(self.deadline, self.gather(quiz_id)) => match gathered {
                Ok(result) => result,
                Err(_) => Err(ExtractError::DeadlineExceeded(self.deadline)),
            },
        }?;

        debug!(
            quiz_id = %quiz_id,
            participants = quiz.participants.len(),
            questions = quiz.questions.len(),
            "Extracted quiz"
        );
        Ok(quiz)
    }

    async fn delete(&self, quiz_id: &str) -> Result<(), ExtractError> {
        let prefix = quiz_prefix(quiz_id);
        let deleted = self
            .source
            .delete_by_prefix(&prefix)
            .await
            .map_err(|source| ExtractError::Source {
                attribute: "quiz keys",
                key: format!("{}*", prefix),
                source,
            })?;
        debug!(quiz_id = %quiz_id, deleted, "Deleted quiz keys");
        Ok(())
    }
}

/// Epoch seconds before 1970 are rejected.
fn parse_epoch_secs(raw: &str) -> Option<DateTime<Utc>> {
    let secs = raw.trim().parse::<u64>().ok()?;
    DateTime::from_timestamp(i64::try_from(secs).ok()?, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::extract::source::MemorySource;

    const QUIZ_ID: &str = "quiz1";
    const USER_1: &str = "2c3ca3d2";
    const USER_2: &str = "ee14ccb2";

    fn populate(source: &MemorySource, quiz_id: &str) {
        let strings = vec![
            ("quizName".to_string(), "example"),
            ("questionDuration".to_string(), "10"),
            ("startTime".to_string(), "1643273678"),
            ("stopTime".to_string(), "1643273706"),
            (format!("{}:username", USER_1), "user1"),
            (format!("{}:stopTime", USER_1), "1643273706"),
            (
                format!("{}:answer:3", USER_1),
                r#"{"selectedOptionIndexes":[1],"answeredInDuration":8}"#,
            ),
            (
                format!("{}:answer:4", USER_1),
                r#"{"selectedOptionIndexes":[],"answeredInDuration":11}"#,
            ),
            (
                format!("{}:answer:5", USER_1),
                r#"{"selectedOptionIndexes":[1],"answeredInDuration":2}"#,
            ),
            (format!("{}:username", USER_2), "user2"),
            (format!("{}:stopTime", USER_2), "1643273701"),
            (
                format!("{}:answer:3", USER_2),
                r#"{"selectedOptionIndexes":[0],"answeredInDuration":2}"#,
            ),
            (
                format!("{}:answer:4", USER_2),
                r#"{"selectedOptionIndexes":[2,0],"answeredInDuration":3}"#,
            ),
            (
                format!("{}:answer:5", USER_2),
                r#"{"selectedOptionIndexes":[],"answeredInDuration":11}"#,
            ),
        ];
        for (field, value) in strings {
            source.set(format!("{}:{}", quiz_id, field), value);
        }
        source.push(
            format!("{}:selectedQuestionIndexes", quiz_id),
            &["3", "4", "5"],
        );
        source.push(format!("{}:selectedCategories", quiz_id), &["Food"]);
        source.add_scored(format!("{}:leaderboard", quiz_id), USER_1, 35.0);
        source.add_scored(format!("{}:leaderboard", quiz_id), USER_2, 80.0);
    }

    fn extractor_over(source: Arc<dyn KeyValueSource>) -> KeyValueExtractor {
        KeyValueExtractor::new(source)
    }

    /// Wraps a memory source, failing or stalling reads of one key.
    struct FaultySource {
        inner: MemorySource,
        fail_key: Option<String>,
        stall: Option<Duration>,
    }

    #[async_trait]
    impl KeyValueSource for FaultySource {
        async fn get(&self, key: &str) -> Result<Option<String>, SourceError> {
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            if self.fail_key.as_deref() == Some(key) {
                return Err(SourceError::Backend("connection reset".to_string()));
            }
            self.inner.get(key).await
        }

        async fn sorted_set_with_scores(
            &self,
            key: &str,
        ) -> Result<Vec<(String, f64)>, SourceError> {
            if self.fail_key.as_deref() == Some(key) {
                return Err(SourceError::Backend("connection reset".to_string()));
            }
            self.inner.sorted_set_with_scores(key).await
        }

        async fn list_range(&self, key: &str) -> Result<Vec<String>, SourceError> {
            self.inner.list_range(key).await
        }

        async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, SourceError> {
            self.inner.delete_by_prefix(prefix).await
        }
    }

    #[tokio::test]
    async fn test_extract_complete_quiz() {
        let source = Arc::new(MemorySource::new());
        populate(&source, QUIZ_ID);

        let quiz = extractor_over(source)
            .extract(QUIZ_ID, &CancellationToken::new())
            .await
            .expect("extract should succeed");

        assert_eq!(quiz.id, QUIZ_ID);
        assert_eq!(quiz.name, "example");
        assert_eq!(quiz.question_duration, Duration::from_secs(10));
        assert_eq!(quiz.start_time.timestamp(), 1643273678);
        assert_eq!(quiz.stop_time.timestamp(), 1643273706);

        assert_eq!(quiz.participants.len(), 2);
        let scores: Vec<i64> = quiz.participants.iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![35, 80]);
        assert_eq!(quiz.participants[0].name, "user1");
        assert_eq!(quiz.participants[1].stop_time.timestamp(), 1643273701);

        let order: Vec<&str> = quiz.questions.iter().map(|q| q.question.as_str()).collect();
        assert_eq!(order, vec!["3", "4", "5"]);
        for question in &quiz.questions {
            assert_eq!(question.participant_answers.len(), 2);
            assert!(!question.is_combined());
        }

        let q4_user2 = &quiz.questions[1].participant_answers[1];
        assert_eq!(q4_user2.user_id, USER_2);
        assert_eq!(q4_user2.participant_options, vec![2, 0]);
        assert_eq!(q4_user2.answered_in_duration, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_extract_preserves_selected_index_order() {
        let source = Arc::new(MemorySource::new());
        populate(&source, QUIZ_ID);
        source.remove("quiz1:selectedQuestionIndexes");
        source.push("quiz1:selectedQuestionIndexes", &["5", "3", "4"]);

        let quiz = extractor_over(source)
            .extract(QUIZ_ID, &CancellationToken::new())
            .await
            .expect("extract should succeed");

        let order: Vec<&str> = quiz.questions.iter().map(|q| q.question.as_str()).collect();
        assert_eq!(order, vec!["5", "3", "4"]);
    }

    #[tokio::test]
    async fn test_extract_missing_key_names_key() {
        let fields = [
            "quizName".to_string(),
            "questionDuration".to_string(),
            "startTime".to_string(),
            "stopTime".to_string(),
            format!("{}:username", USER_1),
            format!("{}:stopTime", USER_1),
            format!("{}:answer:3", USER_1),
            format!("{}:answer:4", USER_1),
            format!("{}:answer:5", USER_1),
            format!("{}:username", USER_2),
            format!("{}:stopTime", USER_2),
            format!("{}:answer:3", USER_2),
            format!("{}:answer:4", USER_2),
            format!("{}:answer:5", USER_2),
        ];

        for field in fields {
            let key = format!("{}:{}", QUIZ_ID, field);
            let source = Arc::new(MemorySource::new());
            populate(&source, QUIZ_ID);
            assert!(source.remove(&key), "fixture should contain '{}'", key);

            let err = extractor_over(source)
                .extract(QUIZ_ID, &CancellationToken::new())
                .await
                .expect_err("extract should fail with a missing key");
            assert!(
                err.to_string().contains(&key),
                "error '{}' should name '{}'",
                err,
                key
            );
        }
    }

    #[tokio::test]
    async fn test_extract_branch_failure_aborts() {
        let inner = MemorySource::new();
        populate(&inner, QUIZ_ID);
        let source = Arc::new(FaultySource {
            inner,
            fail_key: Some("quiz1:leaderboard".to_string()),
            stall: None,
        });

        let err = extractor_over(source)
            .extract(QUIZ_ID, &CancellationToken::new())
            .await
            .expect_err("leaderboard failure should abort extraction");
        assert!(err
            .to_string()
            .starts_with("failed to load leaderboard from key 'quiz1:leaderboard'"));
    }

    #[tokio::test]
    async fn test_extract_malformed_answer() {
        let source = Arc::new(MemorySource::new());
        populate(&source, QUIZ_ID);
        source.set(format!("quiz1:{}:answer:4", USER_2), "not json");

        let err = extractor_over(source)
            .extract(QUIZ_ID, &CancellationToken::new())
            .await
            .expect_err("malformed blob should fail");
        assert!(matches!(err, ExtractError::Malformed { .. }));
        assert!(err.to_string().contains("quiz1:ee14ccb2:answer:4"));
    }

    #[tokio::test]
    async fn test_extract_malformed_values_name_their_key() {
        let cases: Vec<(String, Box<dyn Fn(&MemorySource)>)> = vec![
            (
                "quiz1:questionDuration".to_string(),
                Box::new(|s: &MemorySource| s.set("quiz1:questionDuration", "ten")),
            ),
            (
                "quiz1:questionDuration".to_string(),
                Box::new(|s: &MemorySource| s.set("quiz1:questionDuration", "-10")),
            ),
            (
                "quiz1:startTime".to_string(),
                Box::new(|s: &MemorySource| s.set("quiz1:startTime", "1643273678.5")),
            ),
            (
                "quiz1:startTime".to_string(),
                Box::new(|s: &MemorySource| s.set("quiz1:startTime", "-100")),
            ),
            (
                "quiz1:stopTime".to_string(),
                Box::new(|s: &MemorySource| s.set("quiz1:stopTime", "-50")),
            ),
            (
                format!("quiz1:{}:stopTime", USER_2),
                Box::new(|s: &MemorySource| s.set(format!("quiz1:{}:stopTime", USER_2), "-1")),
            ),
            (
                "quiz1:selectedQuestionIndexes".to_string(),
                Box::new(|s: &MemorySource| {
                    s.remove("quiz1:selectedQuestionIndexes");
                    s.push("quiz1:selectedQuestionIndexes", &["3", "four"]);
                }),
            ),
            (
                "quiz1:leaderboard".to_string(),
                Box::new(|s: &MemorySource| s.add_scored("quiz1:leaderboard", USER_1, f64::NAN)),
            ),
            (
                "quiz1:leaderboard".to_string(),
                Box::new(|s: &MemorySource| {
                    s.add_scored("quiz1:leaderboard", USER_1, f64::INFINITY)
                }),
            ),
            (
                "quiz1:leaderboard".to_string(),
                Box::new(|s: &MemorySource| s.add_scored("quiz1:leaderboard", USER_1, -7.0)),
            ),
        ];

        for (key, corrupt) in cases {
            let source = Arc::new(MemorySource::new());
            populate(&source, QUIZ_ID);
            corrupt(&source);

            let err = extractor_over(source)
                .extract(QUIZ_ID, &CancellationToken::new())
                .await
                .expect_err("malformed value should fail extraction");
            assert!(
                matches!(err, ExtractError::Malformed { .. }),
                "unexpected error for '{}': {}",
                key,
                err
            );
            assert!(
                err.to_string().contains(&key),
                "error '{}' should name '{}'",
                err,
                key
            );
        }
    }

    #[tokio::test]
    async fn test_extract_rejects_inverted_times() {
        let source = Arc::new(MemorySource::new());
        populate(&source, QUIZ_ID);
        source.set("quiz1:stopTime", "1643273000");

        let err = extractor_over(source)
            .extract(QUIZ_ID, &CancellationToken::new())
            .await
            .expect_err("stop before start should fail");
        assert!(matches!(err, ExtractError::InvalidTimes { .. }));
    }

    #[tokio::test]
    async fn test_extract_empty_leaderboard() {
        let source = Arc::new(MemorySource::new());
        populate(&source, QUIZ_ID);
        source.remove("quiz1:leaderboard");

        let quiz = extractor_over(source)
            .extract(QUIZ_ID, &CancellationToken::new())
            .await
            .expect("no participants is still a quiz");
        assert!(quiz.participants.is_empty());
        assert_eq!(quiz.questions.len(), 3);
        assert!(quiz.questions.iter().all(|q| q.participant_answers.is_empty()));
    }

    #[tokio::test]
    async fn test_extract_deadline() {
        let inner = MemorySource::new();
        populate(&inner, QUIZ_ID);
        let source = Arc::new(FaultySource {
            inner,
            fail_key: None,
            stall: Some(Duration::from_secs(10)),
        });

        let extractor = extractor_over(source).with_deadline(Duration::from_millis(20));
        let err = extractor
            .extract(QUIZ_ID, &CancellationToken::new())
            .await
            .expect_err("stalled reads should hit the deadline");
        assert!(matches!(err, ExtractError::DeadlineExceeded(_)));
    }

    #[tokio::test]
    async fn test_extract_cancelled() {
        let source = Arc::new(MemorySource::new());
        populate(&source, QUIZ_ID);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = extractor_over(source)
            .extract(QUIZ_ID, &cancel)
            .await
            .expect_err("cancelled token should abort");
        assert!(matches!(err, ExtractError::Cancelled));
    }

    #[tokio::test]
    async fn test_delete_leaves_other_quizzes() {
        let source = Arc::new(MemorySource::new());
        populate(&source, "quiztokeep");
        let keep_keys = source.keys();
        populate(&source, "quiztodelete");

        extractor_over(source.clone())
            .delete("quiztodelete")
            .await
            .expect("delete should succeed");

        assert_eq!(source.keys(), keep_keys);
    }
}
