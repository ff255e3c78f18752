//! In-memory representation of a quiz's combined results.
//!
//! A [`Quiz`] is created fresh for each job by the extractor, has its
//! question placeholders replaced by the combine step, and is read-only from
//! then on.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One participant's answer to a single question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answerer {
    /// Foreign key into [`Quiz::participants`].
    pub user_id: String,
    /// Option indexes selected by the participant, order irrelevant.
    pub participant_options: Vec<u32>,
    #[serde(with = "duration_secs")]
    pub answered_in_duration: Duration,
}

/// Per-question summary of a quiz.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSummary {
    /// Until combined this holds the decimal position of the question in the
    /// question set. Afterwards it holds the question text.
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_options: Option<Vec<u32>>,
    pub participant_answers: Vec<Answerer>,
}

impl QuestionSummary {
    /// Creates an uncombined summary whose question is the placeholder index.
    pub fn placeholder(index: usize, participant_answers: Vec<Answerer>) -> Self {
        Self {
            question: index.to_string(),
            options: None,
            correct_options: None,
            participant_answers,
        }
    }

    /// Returns true once question text, options and answers have been joined in.
    pub fn is_combined(&self) -> bool {
        self.options.is_some() && self.correct_options.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    pub name: String,
    pub score: i64,
    pub stop_time: DateTime<Utc>,
}

/// The aggregate root of one quiz's results, partitioned by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    pub name: String,
    /// Time allotted per question.
    #[serde(with = "duration_secs")]
    pub question_duration: Duration,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    /// Questions in presentation order.
    pub questions: Vec<QuestionSummary>,
    /// Participants, unique by user id.
    pub participants: Vec<Participant>,
}

impl Quiz {
    /// Looks up a participant by user id.
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }
}

/// Serializes a `Duration` as whole seconds.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_quiz() -> Quiz {
        let start = DateTime::from_timestamp(1_643_273_678, 0).expect("valid timestamp");
        let stop = DateTime::from_timestamp(1_643_273_706, 0).expect("valid timestamp");
        Quiz {
            id: "quiz1".to_string(),
            name: "example".to_string(),
            question_duration: Duration::from_secs(10),
            start_time: start,
            stop_time: stop,
            questions: vec![QuestionSummary::placeholder(
                3,
                vec![Answerer {
                    user_id: "u1".to_string(),
                    participant_options: vec![1],
                    answered_in_duration: Duration::from_secs(8),
                }],
            )],
            participants: vec![Participant {
                user_id: "u1".to_string(),
                name: "user1".to_string(),
                score: 35,
                stop_time: stop,
            }],
        }
    }

    #[test]
    fn test_placeholder_is_uncombined() {
        let summary = QuestionSummary::placeholder(4, Vec::new());
        assert_eq!(summary.question, "4");
        assert!(!summary.is_combined());
    }

    #[test]
    fn test_document_shape() {
        let doc = serde_json::to_value(sample_quiz()).expect("quiz should serialize");

        assert_eq!(doc["id"], "quiz1");
        assert_eq!(doc["questionDuration"], 10);
        assert_eq!(doc["questions"][0]["question"], "3");
        assert!(doc["questions"][0].get("options").is_none());
        assert_eq!(
            doc["questions"][0]["participantAnswers"][0]["answeredInDuration"],
            8
        );
        assert_eq!(doc["participants"][0]["score"], 35);
    }

    #[test]
    fn test_participant_lookup() {
        let quiz = sample_quiz();
        assert_eq!(quiz.participant("u1").map(|p| p.score), Some(35));
        assert!(quiz.participant("missing").is_none());
    }
}
