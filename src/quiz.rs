//! Quiz content: multiple choice questions, read from a RON file.
//!
//! ```text
//! (
//!     test_id: "t1",
//!     title: "Fractions",
//!     questions: [
//!         (
//!             question_id: "q1",
//!             question_text: "1/2 + 1/4?",
//!             options: [
//!                 (option_id: "a", option_text: "3/4", is_correct: true),
//!                 (option_id: "b", option_text: "2/6", is_correct: false),
//!             ],
//!         ),
//!     ],
//! )
//! ```

use crate::event::Button;

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, fs, path::Path};

/// One answer to a question. Options are selected by button in order, the
/// first by `A`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct QuizOption {
    pub option_id: String,
    pub option_text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// A multiple choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct Question {
    pub question_id: String,
    pub question_text: String,
    pub options: Vec<QuizOption>,
}

impl Question {
    /// The option a button selects, if any.
    pub fn option_for(&self, button: Button) -> Option<&QuizOption> {
        self.options.get(button.option_index()?)
    }

    /// The first option marked correct.
    pub fn correct_option(&self) -> Option<&QuizOption> {
        self.options.iter().find(|o| o.is_correct)
    }
}

/// A whole quiz, run one question at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct Quiz {
    pub test_id: String,
    pub title: String,
    pub questions: Vec<Question>,
}

#[derive(Debug)]
#[allow(missing_docs)]
pub enum QuizError {
    IoError(std::io::Error),
    RonSpannedError(ron::de::SpannedError),
    NoQuestions,
}

impl fmt::Display for QuizError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            QuizError::IoError(error) => Cow::from(format!("io error: {}", error)),
            QuizError::RonSpannedError(error) => Cow::from(format!("ron error: {}", error)),
            QuizError::NoQuestions => Cow::from("quiz has no questions"),
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for QuizError {}

impl Quiz {
    /// Reads a quiz from a RON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, QuizError> {
        let text = fs::read_to_string(path).map_err(QuizError::IoError)?;
        Self::from_ron(&text)
    }

    /// Parses a quiz. One without questions is an error.
    pub fn from_ron(text: &str) -> Result<Self, QuizError> {
        let quiz: Quiz = ron::from_str(text).map_err(QuizError::RonSpannedError)?;
        if quiz.questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }
        Ok(quiz)
    }

    /// Question ids, in the order they are asked.
    pub fn question_ids(&self) -> Vec<String> {
        self.questions.iter().map(|q| q.question_id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"(
        test_id: "t1",
        title: "Fractions",
        questions: [
            (
                question_id: "q1",
                question_text: "1/2 + 1/4?",
                options: [
                    (option_id: "a", option_text: "3/4", is_correct: true),
                    (option_id: "b", option_text: "2/6"),
                ],
            ),
        ],
    )"#;

    #[test]
    fn parses_sample() {
        let quiz = Quiz::from_ron(SAMPLE).unwrap();
        assert_eq!(quiz.question_ids(), vec!["q1".to_owned()]);
        let q = &quiz.questions[0];
        assert_eq!(q.correct_option().unwrap().option_id, "a");
        assert_eq!(q.option_for(Button::B).unwrap().option_text, "2/6");
        assert_eq!(q.option_for(Button::C), None);
        assert_eq!(q.option_for(Button::Y), None);
    }

    #[test]
    fn empty_quiz_is_rejected() {
        let res = Quiz::from_ron(r#"(test_id: "t", title: "x", questions: [])"#);
        assert!(matches!(res, Err(QuizError::NoQuestions)));
    }
}
