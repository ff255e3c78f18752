//! Quiz result entity model and question set definitions.

pub mod questions;
pub mod types;

pub use questions::{parse_question_set, FileQuestionSets, QuestionDefinition, QuestionSetStore};
pub use types::{Answerer, Participant, QuestionSummary, Quiz};
