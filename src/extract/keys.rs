//! Key naming for live quiz session data.
//!
//! Every key belonging to a quiz starts with `<quizId>:`, which is what makes
//! prefix deletion safe across quizzes.

pub const QUIZ_NAME: &str = "quizName";
pub const QUESTION_DURATION: &str = "questionDuration";
pub const START_TIME: &str = "startTime";
pub const STOP_TIME: &str = "stopTime";
pub const LEADERBOARD: &str = "leaderboard";
pub const SELECTED_QUESTION_INDEXES: &str = "selectedQuestionIndexes";
pub const USERNAME: &str = "username";

/// `<quizId>:<field>`
pub fn quiz_key(quiz_id: &str, field: &str) -> String {
    format!("{}:{}", quiz_id, field)
}

/// `<quizId>:<userId>:<field>`
pub fn user_key(quiz_id: &str, user_id: &str, field: &str) -> String {
    format!("{}:{}:{}", quiz_id, user_id, field)
}

/// `<quizId>:<userId>:answer:<questionIndex>`
pub fn answer_key(quiz_id: &str, user_id: &str, question_index: usize) -> String {
    format!("{}:{}:answer:{}", quiz_id, user_id, question_index)
}

/// The prefix shared by every key of a quiz.
pub fn quiz_prefix(quiz_id: &str) -> String {
    format!("{}:", quiz_id)
}
