//! Answer recording and question navigation
//!
//! The recorder keeps the pending (unsaved) choice per question, the answers
//! the server has acknowledged, and the question pointer. A forward move is
//! two-phase: [`AnswerRecorder::advance`] hands out the answer to persist and
//! the pointer only moves once the persist call has settled.

use std::collections::HashMap;

use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;
use web_time::{Duration, SystemTime};

use crate::{
    config::PersistFailurePolicy,
    ids::{OptionId, QuestionId},
    model::{Answer, Question},
};

/// Errors for operations the recorder refuses
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Error {
    /// A persist call is still in flight
    #[error("an answer is still being saved")]
    AdvanceInFlight,
    /// Advance without a choice for the current question
    #[error("no option selected for the current question")]
    NoPendingChoice,
    /// The option does not belong to the current question
    #[error("option {0} is not part of the current question")]
    UnknownOption(OptionId),
    /// Backward move from the first question
    #[error("already at the first question")]
    AtFirstQuestion,
    /// The session has no questions
    #[error("the session has no questions")]
    NoQuestions,
}

/// Update messages sent to the participant by the recorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UpdateMessage {
    /// The question to display
    Question {
        /// Index of the question (0-based)
        index: usize,
        /// Total number of questions
        count: usize,
        /// The question itself
        question: Question,
        /// Currently selected option, if any
        selected: Option<OptionId>,
        /// Number of questions with a selected or saved answer
        answered: usize,
    },
    /// The current answer is being saved
    Saving {
        /// Question being saved
        question_id: QuestionId,
    },
    /// The answer could not be saved and the attempt moved on without it
    AnswerNotSaved {
        /// Question whose answer was lost
        question_id: QuestionId,
        /// Why saving failed
        reason: String,
    },
    /// The server refused the answer; the participant stays on the question
    AnswerRejected {
        /// Question whose answer was refused
        question_id: QuestionId,
        /// Message from the server
        reason: String,
    },
}

/// Result of settling a persist call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The pointer moved to this index
    Moved(usize),
    /// The last question was settled; the attempt should finish
    Exhausted,
    /// The pointer stays; the pending choice is kept for another try
    Blocked,
    /// The recorder is frozen; the result was recorded and nothing else happens
    Frozen,
}

/// How a persist call failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistFailure {
    /// The request did not complete
    Transport(String),
    /// The server refused the answer
    Rejected(String),
}

/// Holds the in-progress answers of one attempt
#[derive(Debug, Clone)]
pub struct AnswerRecorder {
    questions: Vec<Question>,
    pointer: usize,
    question_started: SystemTime,
    pending: HashMap<QuestionId, OptionId>,
    committed: HashMap<QuestionId, Answer>,
    in_flight: Option<Answer>,
    lost: Vec<QuestionId>,
    frozen: bool,
}

impl AnswerRecorder {
    /// Creates a recorder positioned on the first question
    ///
    /// # Arguments
    ///
    /// * `questions` - The ordered question set
    /// * `now` - Entry time of the first question
    pub fn new(questions: Vec<Question>, now: SystemTime) -> Self {
        Self {
            questions,
            pointer: 0,
            question_started: now,
            pending: HashMap::new(),
            committed: HashMap::new(),
            in_flight: None,
            lost: Vec::new(),
            frozen: false,
        }
    }

    /// Index of the current question
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Number of questions
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Whether the session has no questions
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// The current question
    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.pointer)
    }

    /// The pending choice for the current question
    pub fn selected(&self) -> Option<&OptionId> {
        self.current().and_then(|q| self.pending.get(&q.id))
    }

    /// Whether a persist call is in flight
    pub fn is_saving(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The answer currently being persisted
    pub fn in_flight(&self) -> Option<&Answer> {
        self.in_flight.as_ref()
    }

    /// Answers acknowledged by the server
    pub fn committed(&self, question_id: QuestionId) -> Option<&Answer> {
        self.committed.get(&question_id)
    }

    /// Questions acknowledged by the server, in question order
    pub fn answered_ids(&self) -> Vec<QuestionId> {
        self.questions
            .iter()
            .map(|q| q.id)
            .filter(|id| self.committed.contains_key(id))
            .collect_vec()
    }

    /// Questions whose answer was given up after a failed persist
    pub fn lost_ids(&self) -> Vec<QuestionId> {
        self.lost.iter().copied().unique().collect_vec()
    }

    /// Stops navigation; persist results arriving later are only recorded
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Stores the pending choice for the current question
    ///
    /// Re-selecting before advancing overwrites the previous choice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdvanceInFlight`] while saving and
    /// [`Error::UnknownOption`] for options of other questions.
    pub fn select(&mut self, option: OptionId) -> Result<(), Error> {
        if self.in_flight.is_some() {
            return Err(Error::AdvanceInFlight);
        }
        let question = self.current().ok_or(Error::NoQuestions)?;
        if !question.has_option(&option) {
            return Err(Error::UnknownOption(option));
        }
        let question_id = question.id;
        self.pending.insert(question_id, option);
        Ok(())
    }

    /// Starts a forward move and returns the answer to persist
    ///
    /// The time spent is measured from the moment the question was entered,
    /// rounded to whole seconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdvanceInFlight`] while a previous advance is
    /// unsettled and [`Error::NoPendingChoice`] without a selection.
    pub fn advance(&mut self, now: SystemTime) -> Result<Answer, Error> {
        if self.in_flight.is_some() {
            return Err(Error::AdvanceInFlight);
        }
        let question = self.current().ok_or(Error::NoQuestions)?;
        let option = self
            .pending
            .get(&question.id)
            .cloned()
            .ok_or(Error::NoPendingChoice)?;

        let spent = now
            .duration_since(self.question_started)
            .unwrap_or_default();
        let answer = Answer {
            question_id: question.id,
            option_id: option,
            time_spent_seconds: round_seconds(spent),
        };
        self.in_flight = Some(answer.clone());
        Ok(answer)
    }

    /// Records a successful persist and moves forward
    pub fn persist_succeeded(&mut self, now: SystemTime) -> Option<Step> {
        let answer = self.in_flight.take()?;
        self.pending.remove(&answer.question_id);
        self.committed.insert(answer.question_id, answer);
        Some(self.step(now))
    }

    /// Records a failed persist
    ///
    /// Rejections always keep the participant on the question. Transport
    /// failures do so only under [`PersistFailurePolicy::Block`]; otherwise
    /// the answer is recorded as lost and the pointer moves on.
    pub fn persist_failed(
        &mut self,
        failure: &PersistFailure,
        policy: PersistFailurePolicy,
        now: SystemTime,
    ) -> Option<Step> {
        let question_id = self.in_flight.as_ref()?.question_id;
        let keep = match failure {
            PersistFailure::Rejected(_) => true,
            PersistFailure::Transport(_) => policy == PersistFailurePolicy::Block,
        };

        if keep && !self.frozen {
            if matches!(failure, PersistFailure::Rejected(_)) {
                self.in_flight = None;
            }
            return Some(Step::Blocked);
        }

        self.in_flight = None;
        if !self.committed.contains_key(&question_id) {
            self.lost.push(question_id);
        }
        Some(self.step(now))
    }

    /// Hands out the in-flight answer again after a blocked transport failure
    pub fn retry_in_flight(&self) -> Option<Answer> {
        self.in_flight.clone()
    }

    /// Moves the pointer back one question without persisting anything
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdvanceInFlight`] while saving and
    /// [`Error::AtFirstQuestion`] on the first question.
    pub fn back(&mut self, now: SystemTime) -> Result<usize, Error> {
        if self.in_flight.is_some() {
            return Err(Error::AdvanceInFlight);
        }
        if self.pointer == 0 {
            return Err(Error::AtFirstQuestion);
        }
        self.move_to(self.pointer - 1, now);
        Ok(self.pointer)
    }

    /// The question view for the current pointer
    pub fn view(&self) -> Option<UpdateMessage> {
        let question = self.current()?;
        Some(UpdateMessage::Question {
            index: self.pointer,
            count: self.questions.len(),
            question: question.clone(),
            selected: self.selected().cloned(),
            answered: self
                .questions
                .iter()
                .filter(|q| self.pending.contains_key(&q.id) || self.committed.contains_key(&q.id))
                .count(),
        })
    }

    fn step(&mut self, now: SystemTime) -> Step {
        if self.frozen {
            return Step::Frozen;
        }
        if self.pointer + 1 >= self.questions.len() {
            return Step::Exhausted;
        }
        self.move_to(self.pointer + 1, now);
        Step::Moved(self.pointer)
    }

    /// Every pointer move restarts the per-question timer; a revisited
    /// question starts with its saved choice selected
    fn move_to(&mut self, index: usize, now: SystemTime) {
        self.pointer = index;
        self.question_started = now;
        if let Some(question) = self.questions.get(index) {
            if let Some(saved) = self.committed.get(&question.id) {
                self.pending
                    .entry(question.id)
                    .or_insert_with(|| saved.option_id.clone());
            }
        }
    }
}

fn round_seconds(duration: Duration) -> u64 {
    ((duration.as_millis() + 500) / 1000) as u64
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::model::AnswerOption;

    fn questions(count: u64) -> Vec<Question> {
        (1..=count)
            .map(|id| Question {
                id: QuestionId::from(id),
                text: format!("Question {id}"),
                options: ["A", "B", "C", "D"]
                    .into_iter()
                    .map(|label| AnswerOption {
                        id: OptionId::new(label),
                        text: format!("Option {label}"),
                    })
                    .collect(),
                difficulty: None,
                points: Some(1),
            })
            .collect()
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_select_overwrites_pending_choice() {
        let mut recorder = AnswerRecorder::new(questions(3), at(0));

        recorder.select(OptionId::new("A")).unwrap();
        recorder.select(OptionId::new("C")).unwrap();
        recorder.select(OptionId::new("C")).unwrap();

        assert_eq!(recorder.selected(), Some(&OptionId::new("C")));
        let answer = recorder.advance(at(12)).unwrap();
        assert_eq!(answer.option_id, OptionId::new("C"));
        assert_eq!(answer.time_spent_seconds, 12);
    }

    #[test]
    fn test_select_unknown_option() {
        let mut recorder = AnswerRecorder::new(questions(1), at(0));
        assert_eq!(
            recorder.select(OptionId::new("Z")),
            Err(Error::UnknownOption(OptionId::new("Z")))
        );
    }

    #[test]
    fn test_advance_requires_choice() {
        let mut recorder = AnswerRecorder::new(questions(2), at(0));
        assert_eq!(recorder.advance(at(1)), Err(Error::NoPendingChoice));
    }

    #[test]
    fn test_pointer_moves_only_after_persist_settles() {
        let mut recorder = AnswerRecorder::new(questions(3), at(0));
        recorder.select(OptionId::new("A")).unwrap();
        recorder.advance(at(5)).unwrap();

        assert_eq!(recorder.pointer(), 0);
        assert!(recorder.is_saving());
        assert_eq!(recorder.advance(at(6)), Err(Error::AdvanceInFlight));
        assert_eq!(
            recorder.select(OptionId::new("B")),
            Err(Error::AdvanceInFlight)
        );

        assert_eq!(recorder.persist_succeeded(at(7)), Some(Step::Moved(1)));
        assert_eq!(recorder.pointer(), 1);
        assert_eq!(recorder.answered_ids(), vec![QuestionId::from(1)]);
    }

    #[test]
    fn test_time_spent_resets_on_each_question() {
        let mut recorder = AnswerRecorder::new(questions(3), at(0));
        recorder.select(OptionId::new("A")).unwrap();
        recorder.advance(at(10)).unwrap();
        recorder.persist_succeeded(at(11));

        recorder.select(OptionId::new("B")).unwrap();
        let answer = recorder.advance(at(31)).unwrap();

        assert_eq!(answer.time_spent_seconds, 20);
    }

    #[test]
    fn test_time_spent_is_rounded() {
        let mut recorder = AnswerRecorder::new(questions(2), at(0));
        recorder.select(OptionId::new("A")).unwrap();
        let answer = recorder
            .advance(at(4) + Duration::from_millis(600))
            .unwrap();
        assert_eq!(answer.time_spent_seconds, 5);
    }

    #[test]
    fn test_last_question_is_exhausted() {
        let mut recorder = AnswerRecorder::new(questions(1), at(0));
        recorder.select(OptionId::new("D")).unwrap();
        recorder.advance(at(3)).unwrap();

        assert_eq!(recorder.persist_succeeded(at(4)), Some(Step::Exhausted));
        assert_eq!(recorder.pointer(), 0);
    }

    #[test]
    fn test_transport_failure_advances_under_default_policy() {
        let mut recorder = AnswerRecorder::new(questions(3), at(0));
        recorder.select(OptionId::new("A")).unwrap();
        recorder.advance(at(2)).unwrap();

        let step = recorder.persist_failed(
            &PersistFailure::Transport("offline".to_owned()),
            PersistFailurePolicy::Advance,
            at(3),
        );

        assert_eq!(step, Some(Step::Moved(1)));
        assert_eq!(recorder.lost_ids(), vec![QuestionId::from(1)]);
        assert!(recorder.answered_ids().is_empty());
    }

    #[test]
    fn test_transport_failure_blocks_under_block_policy() {
        let mut recorder = AnswerRecorder::new(questions(3), at(0));
        recorder.select(OptionId::new("A")).unwrap();
        let answer = recorder.advance(at(2)).unwrap();

        let step = recorder.persist_failed(
            &PersistFailure::Transport("offline".to_owned()),
            PersistFailurePolicy::Block,
            at(3),
        );

        assert_eq!(step, Some(Step::Blocked));
        assert_eq!(recorder.pointer(), 0);
        assert_eq!(recorder.retry_in_flight(), Some(answer));
    }

    #[test]
    fn test_rejection_always_blocks_and_keeps_choice() {
        let mut recorder = AnswerRecorder::new(questions(3), at(0));
        recorder.select(OptionId::new("B")).unwrap();
        recorder.advance(at(2)).unwrap();

        let step = recorder.persist_failed(
            &PersistFailure::Rejected("invalid".to_owned()),
            PersistFailurePolicy::Advance,
            at(3),
        );

        assert_eq!(step, Some(Step::Blocked));
        assert!(!recorder.is_saving());
        assert_eq!(recorder.selected(), Some(&OptionId::new("B")));
        assert!(recorder.lost_ids().is_empty());
    }

    #[test]
    fn test_back_prefills_saved_choice_and_does_not_persist() {
        let mut recorder = AnswerRecorder::new(questions(3), at(0));
        recorder.select(OptionId::new("C")).unwrap();
        recorder.advance(at(2)).unwrap();
        recorder.persist_succeeded(at(3));

        assert_eq!(recorder.back(at(4)), Ok(0));
        assert_eq!(recorder.selected(), Some(&OptionId::new("C")));
        assert!(!recorder.is_saving());
        assert_eq!(recorder.back(at(5)), Err(Error::AtFirstQuestion));
    }

    #[test]
    fn test_frozen_recorder_records_but_does_not_move() {
        let mut recorder = AnswerRecorder::new(questions(3), at(0));
        recorder.select(OptionId::new("A")).unwrap();
        recorder.advance(at(2)).unwrap();
        recorder.freeze();

        assert_eq!(recorder.persist_succeeded(at(3)), Some(Step::Frozen));
        assert_eq!(recorder.pointer(), 0);
        assert_eq!(recorder.answered_ids(), vec![QuestionId::from(1)]);
    }

    #[test]
    fn test_view_counts_selected_and_saved_answers() {
        let mut recorder = AnswerRecorder::new(questions(3), at(0));
        recorder.select(OptionId::new("A")).unwrap();
        recorder.advance(at(1)).unwrap();
        recorder.persist_succeeded(at(1));
        recorder.select(OptionId::new("B")).unwrap();

        let Some(UpdateMessage::Question {
            index,
            count,
            selected,
            answered,
            ..
        }) = recorder.view()
        else {
            panic!("Expected a question view");
        };
        assert_eq!((index, count, answered), (1, 3, 2));
        assert_eq!(selected, Some(OptionId::new("B")));
    }

    #[test]
    fn test_empty_question_set() {
        let mut recorder = AnswerRecorder::new(Vec::new(), at(0));
        assert!(recorder.is_empty());
        assert_eq!(recorder.select(OptionId::new("A")), Err(Error::NoQuestions));
        assert!(recorder.view().is_none());
    }
}
