//! Session, question, answer and result data
//!
//! These are the read-only values the controller receives from the server,
//! plus the [`Answer`] it produces for each question.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use web_time::{Duration, SystemTime};

use crate::ids::{OptionId, QuestionId, SessionId};

/// Difficulty tag attached to a question by the question bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Easy question
    Easy,
    /// Medium question
    Medium,
    /// Hard question
    Hard,
    /// Any tag this client does not know about
    #[serde(other)]
    Other,
}

/// One selectable option of a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    /// Option identifier, e.g. `"A"`
    pub id: OptionId,
    /// Text shown to the participant
    #[serde(alias = "label")]
    pub text: String,
}

/// A question as served for one session
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Question identifier
    pub id: QuestionId,
    /// Prompt text
    #[serde(alias = "prompt")]
    pub text: String,
    /// Options in display order
    pub options: Vec<AnswerOption>,
    /// Difficulty tag, if the bank sets one
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    /// Points awarded for a correct answer
    #[serde(default, alias = "marks")]
    pub points: Option<u32>,
}

impl Question {
    /// Whether `option` is one of this question's options
    pub fn has_option(&self, option: &OptionId) -> bool {
        self.options.iter().any(|o| &o.id == option)
    }
}

/// Lifecycle of a session as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Not yet activated
    NotStarted,
    /// Running
    Active,
    /// Closed by a finish request
    Finished,
}

/// Read-only copy of the server's session metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMeta {
    /// Session identifier
    pub id: SessionId,
    /// Authoritative start time
    pub start_time: SystemTime,
    /// Total time allowed
    pub duration: Duration,
    /// Number of questions served
    pub total_questions: usize,
    /// Lifecycle status
    pub status: SessionStatus,
}

impl SessionMeta {
    /// Duration in whole minutes as the server expresses it
    pub fn duration_minutes(&self) -> u64 {
        self.duration.as_secs() / 60
    }
}

/// The participant's answer to one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// Question answered
    pub question_id: QuestionId,
    /// Chosen option
    pub option_id: OptionId,
    /// Seconds spent on the question before advancing
    pub time_spent_seconds: u64,
}

/// Score payload returned by a successful finish or a published result
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizResult {
    /// Points scored
    pub score: u32,
    /// Maximum attainable points
    pub total_marks: Option<u32>,
    /// Number of questions in the session
    pub total_questions: Option<u32>,
    /// Seconds between start and finish
    pub time_taken: Option<u64>,
    /// Rank among participants, once ranked
    pub rank: Option<u32>,
    /// Server-side status label such as `completed`
    pub status: Option<String>,
}

impl QuizResult {
    /// Score as a whole percentage of the maximum, falling back to the
    /// question count when the server omits total marks
    pub fn percentage(&self) -> Option<u32> {
        let total = self.total_marks.or(self.total_questions)?;
        if total == 0 {
            return None;
        }
        Some(((f64::from(self.score) / f64::from(total)) * 100.).round() as u32)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_question_deserializes_with_optional_fields_missing() {
        let question: Question = serde_json::from_str(
            r#"{"id": 3, "text": "2 + 2?", "options": [{"id": "A", "text": "4"}, {"id": "B", "text": "5"}]}"#,
        )
        .unwrap();

        assert_eq!(question.id, QuestionId::from(3));
        assert_eq!(question.options.len(), 2);
        assert_eq!(question.difficulty, None);
        assert!(question.has_option(&OptionId::new("A")));
        assert!(!question.has_option(&OptionId::new("C")));
    }

    #[test]
    fn test_unknown_difficulty_is_tolerated() {
        let question: Question = serde_json::from_str(
            r#"{"id": 1, "text": "q", "options": [], "difficulty": "brutal", "marks": 4}"#,
        )
        .unwrap();

        assert_eq!(question.difficulty, Some(Difficulty::Other));
        assert_eq!(question.points, Some(4));
    }

    #[test]
    fn test_option_accepts_label_alias() {
        let option: AnswerOption = serde_json::from_str(r#"{"id": "C", "label": "Paris"}"#).unwrap();
        assert_eq!(option.text, "Paris");
    }

    #[test]
    fn test_result_percentage() {
        let result = QuizResult {
            score: 7,
            total_marks: Some(10),
            ..QuizResult::default()
        };
        assert_eq!(result.percentage(), Some(70));

        let by_questions = QuizResult {
            score: 1,
            total_questions: Some(3),
            ..QuizResult::default()
        };
        assert_eq!(by_questions.percentage(), Some(33));

        assert_eq!(QuizResult::default().percentage(), None);
    }

    #[test]
    fn test_duration_minutes() {
        let meta = SessionMeta {
            id: SessionId::from(1),
            start_time: SystemTime::UNIX_EPOCH,
            duration: Duration::from_secs(15 * 60),
            total_questions: 10,
            status: SessionStatus::Active,
        };
        assert_eq!(meta.duration_minutes(), 15);
    }
}
