//! Joins an extracted quiz with its question set.
//!
//! The extractor only knows each question's position in the question set, so
//! every summary leaves extraction with its index in `question`. Combining
//! swaps that index for the question text and fills in the options and the
//! correct answers.

use crate::error::CombineError;
use crate::quiz::{QuestionDefinition, Quiz};

/// Replaces every placeholder question in `extracted` with its definition.
///
/// Question order, participant answers and participants are left untouched.
/// The first summary whose placeholder is not a decimal index, or whose index
/// falls outside `questions`, fails the whole combine.
pub fn combine(mut extracted: Quiz, questions: &[QuestionDefinition]) -> Result<Quiz, CombineError> {
    for summary in extracted.questions.iter_mut() {
        let index = parse_index(&summary.question)?;
        let definition = questions
            .get(index)
            .ok_or(CombineError::IndexOutOfRange {
                index,
                available: questions.len(),
            })?;

        summary.question = definition.question.clone();
        summary.options = Some(definition.options.clone());
        summary.correct_options = Some(definition.answers.clone());
    }
    Ok(extracted)
}

/// Accepts plain ASCII digits only, so signs and whitespace are rejected.
fn parse_index(placeholder: &str) -> Result<usize, CombineError> {
    if placeholder.is_empty() || !placeholder.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CombineError::NotAnIndex(placeholder.to_string()));
    }
    placeholder
        .parse::<usize>()
        .map_err(|_| CombineError::NotAnIndex(placeholder.to_string()))
}
