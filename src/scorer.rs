//! Turns the closed collection windows of a quiz into per-student scores
//! and per-question statistics.
//!
//! The teacher's remote is never scored. A student who never pressed
//! anything still gets a full record with zero answers, which is a result
//! in its own right and not an error.

use crate::collection_window::CollectionWindow;
use crate::event::Timestamp;
use crate::quiz::{Question, Quiz};
use crate::registry::Receiver;

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Points for one correct answer.
pub const POINTS_PER_CORRECT: u32 = 10;

/// How one student did on one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct AnswerDetail {
    pub question_id: String,
    pub question_text: String,
    pub selected_option_id: Option<String>,
    pub selected_option_text: Option<String>,
    pub correct_option_id: Option<String>,
    pub correct_option_text: Option<String>,
    pub is_correct: bool,
    pub timestamp: Option<Timestamp>,
}

/// How one student did on the whole quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct StudentSummary {
    pub remote_id: String,
    pub remote_name: String,
    pub score_obtained: u32,
    pub max_score: u32,
    pub correct_answers: usize,
    /// Answered, but wrong.
    pub incorrect_answered: usize,
    pub unanswered: usize,
    pub answered_questions: usize,
    pub total_questions: usize,
    pub answer_details: Vec<AnswerDetail>,
}

impl StudentSummary {
    /// Wrong answers and missing answers together.
    pub fn incorrect_answers(&self) -> usize {
        self.incorrect_answered + self.unanswered
    }

    /// Score as a share of the maximum, in percent.
    pub fn percentage(&self) -> f64 {
        percent(self.score_obtained as usize, self.max_score as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct OptionStats {
    pub option_id: String,
    pub option_text: String,
    pub response_count: usize,
    /// Share of this question's responses.
    pub percentage: f64,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct QuestionStats {
    pub question_id: String,
    pub question_text: String,
    pub total_responses: usize,
    pub correct_responses: usize,
    /// Share of all students, answered or not.
    pub percentage_correct: f64,
    pub options: Vec<OptionStats>,
}

/// Everything known about a finished quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct QuizReport {
    pub test_title: String,
    pub total_students: usize,
    pub total_questions: usize,
    /// Mean of the students' score percentages.
    pub average_score: f64,
    pub question_stats: Vec<QuestionStats>,
    pub student_results: Vec<StudentSummary>,
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn window_for<'a>(windows: &'a [CollectionWindow], question: &Question) -> Option<&'a CollectionWindow> {
    windows.iter().find(|w| w.question_id() == question.question_id)
}

fn answer_detail(question: &Question, window: Option<&CollectionWindow>, remote_id: &str) -> AnswerDetail {
    let correct = question.correct_option();
    let response = window.and_then(|w| w.response(remote_id));
    // A press that maps to no option counts as no answer.
    let selected = response.and_then(|e| question.option_for(e.button));

    AnswerDetail {
        question_id: question.question_id.clone(),
        question_text: question.question_text.clone(),
        selected_option_id: selected.map(|o| o.option_id.clone()),
        selected_option_text: selected.map(|o| o.option_text.clone()),
        correct_option_id: correct.map(|o| o.option_id.clone()),
        correct_option_text: correct.map(|o| o.option_text.clone()),
        is_correct: selected.is_some_and(|o| o.is_correct),
        timestamp: selected.and(response.map(|e| e.timestamp)),
    }
}

/// Scores every student remote of `receiver` over the quiz.
pub fn score(quiz: &Quiz, windows: &[CollectionWindow], receiver: &Receiver) -> QuizReport {
    let total_questions = quiz.questions.len();
    let max_score = total_questions as u32 * POINTS_PER_CORRECT;

    let student_results: Vec<StudentSummary> = receiver
        .students()
        .map(|remote| {
            let answer_details: Vec<AnswerDetail> = quiz
                .questions
                .iter()
                .map(|q| answer_detail(q, window_for(windows, q), &remote.remote_id))
                .collect();
            let correct_answers = answer_details.iter().filter(|a| a.is_correct).count();
            let answered_questions = answer_details
                .iter()
                .filter(|a| a.selected_option_id.is_some())
                .count();

            StudentSummary {
                remote_id: remote.remote_id.clone(),
                remote_name: remote.remote_name.clone(),
                score_obtained: correct_answers as u32 * POINTS_PER_CORRECT,
                max_score,
                correct_answers,
                incorrect_answered: answered_questions - correct_answers,
                unanswered: total_questions - answered_questions,
                answered_questions,
                total_questions,
                answer_details,
            }
        })
        .collect();

    let question_stats = quiz
        .questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let selected: Vec<&str> = student_results
                .iter()
                .filter_map(|s| s.answer_details[i].selected_option_id.as_deref())
                .collect();
            let total_responses = selected.len();
            let correct_responses = student_results
                .iter()
                .filter(|s| s.answer_details[i].is_correct)
                .count();
            let options = q
                .options
                .iter()
                .map(|o| {
                    let response_count = selected.iter().filter(|&&id| id == o.option_id).count();
                    OptionStats {
                        option_id: o.option_id.clone(),
                        option_text: o.option_text.clone(),
                        response_count,
                        percentage: percent(response_count, total_responses),
                        is_correct: o.is_correct,
                    }
                })
                .collect();

            QuestionStats {
                question_id: q.question_id.clone(),
                question_text: q.question_text.clone(),
                total_responses,
                correct_responses,
                percentage_correct: percent(correct_responses, student_results.len()),
                options,
            }
        })
        .collect();

    let average_score = if student_results.is_empty() {
        0.0
    } else {
        student_results.iter().map(|s| s.percentage()).sum::<f64>() / student_results.len() as f64
    };

    QuizReport {
        test_title: quiz.title.clone(),
        total_students: student_results.len(),
        total_questions,
        average_score,
        question_stats,
        student_results,
    }
}

impl QuizReport {
    /// Writes the report as pretty RON.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(ReportError::RonError)?;
        fs::write(path, text).map_err(ReportError::IoError)
    }
}

#[derive(Debug)]
#[allow(missing_docs)]
pub enum ReportError {
    IoError(std::io::Error),
    RonError(ron::Error),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ReportError::IoError(e) => write!(f, "io error: {}", e),
            ReportError::RonError(e) => write!(f, "ron error: {}", e),
        }
    }
}

impl std::error::Error for ReportError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Button, ButtonEvent};
    use crate::quiz::QuizOption;
    use crate::registry::{Registry, RegistrationSession};
    use std::collections::HashSet;

    fn question(id: &str, correct: usize) -> Question {
        Question {
            question_id: id.to_owned(),
            question_text: format!("Question {}", id),
            options: (0..4)
                .map(|i| QuizOption {
                    option_id: format!("{}-{}", id, i),
                    option_text: format!("Option {}", i),
                    is_correct: i == correct,
                })
                .collect(),
        }
    }

    fn receiver(ids: &[&str]) -> Receiver {
        let mut reg = Registry::new();
        let rid = reg.create_receiver("Room").receiver_id.clone();
        let mut session = RegistrationSession::new();
        for id in ids {
            session.observe(id);
        }
        reg.commit(&rid, &session).unwrap();
        reg.find_by_receiver(&rid).unwrap().clone()
    }

    fn window(id: &str, presses: &[(&str, Button)]) -> CollectionWindow {
        let roster: HashSet<String> = ["T", "S1", "S2", "S3"].iter().map(|s| s.to_string()).collect();
        let mut w = CollectionWindow::open(id, Timestamp(0), 30);
        for (i, (remote, button)) in presses.iter().enumerate() {
            w.offer(ButtonEvent::new(*remote, *button, Timestamp(i as u64 + 1)), &roster);
        }
        w.close(Timestamp::from_secs(30));
        w
    }

    fn sample() -> QuizReport {
        let quiz = Quiz {
            test_id: "t".to_owned(),
            title: "Sample".to_owned(),
            questions: vec![question("q1", 0), question("q2", 2)],
        };
        let windows = vec![
            window("q1", &[("T", Button::A), ("S1", Button::A), ("S2", Button::B)]),
            window("q2", &[("S1", Button::C), ("S2", Button::Y)]),
        ];
        score(&quiz, &windows, &receiver(&["T", "S1", "S2", "S3"]))
    }

    #[test]
    fn teacher_is_not_scored() {
        let report = sample();
        let ids: Vec<&str> = report.student_results.iter().map(|s| s.remote_id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2", "S3"]);
        assert_eq!(report.total_students, 3);
    }

    #[test]
    fn per_student_totals() {
        let report = sample();
        let s1 = &report.student_results[0];
        assert_eq!((s1.correct_answers, s1.incorrect_answered, s1.unanswered), (2, 0, 0));
        assert_eq!(s1.score_obtained, 20);
        assert_eq!(s1.max_score, 20);

        // Y selects no option, so q2 counts as unanswered.
        let s2 = &report.student_results[1];
        assert_eq!((s2.correct_answers, s2.incorrect_answered, s2.unanswered), (0, 1, 1));
        assert_eq!(s2.incorrect_answers(), 2);
        assert_eq!(s2.answer_details[1].timestamp, None);

        let s3 = &report.student_results[2];
        assert_eq!(s3.answered_questions, 0);
        assert_eq!(s3.unanswered, 2);
        assert_eq!(s3.score_obtained, 0);

        for s in &report.student_results {
            assert_eq!(s.correct_answers + s.incorrect_answered + s.unanswered, s.total_questions);
        }
    }

    #[test]
    fn question_statistics() {
        let report = sample();
        let q1 = &report.question_stats[0];
        assert_eq!(q1.total_responses, 2);
        assert_eq!(q1.correct_responses, 1);
        assert!((q1.percentage_correct - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(q1.options[0].response_count, 1);
        assert_eq!(q1.options[0].percentage, 50.0);
        assert_eq!(q1.options[1].percentage, 50.0);
        assert_eq!(q1.options[3].response_count, 0);
        assert!(q1.options[0].is_correct);

        let q2 = &report.question_stats[1];
        assert_eq!(q2.total_responses, 1);
        assert_eq!(q2.options[2].percentage, 100.0);

        // S1 100%, S2 0%, S3 0%.
        assert!((report.average_score - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn missing_windows_mean_unanswered() {
        let quiz = Quiz {
            test_id: "t".to_owned(),
            title: "Empty".to_owned(),
            questions: vec![question("q1", 1)],
        };
        let report = score(&quiz, &[], &receiver(&["T", "S1"]));
        assert_eq!(report.student_results[0].unanswered, 1);
        assert_eq!(report.question_stats[0].options[1].percentage, 0.0);
    }

    #[test]
    fn report_writes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.ron");
        sample().to_path(&path).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("Sample"));
    }
}
