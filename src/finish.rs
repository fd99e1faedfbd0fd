//! Finish coordination
//!
//! Every path that ends an attempt (countdown expiry, the last answer, a
//! manual submit, a force-exit) goes through [`FinishCoordinator::begin`].
//! The latch is set before the request leaves, so whichever trigger comes
//! second finds it set and issues nothing. Only a failed request releases it.
//!
//! A failed request may still have closed the session on the server, with
//! only the reply lost. The coordinator remembers that, so a retry answered
//! with "already finished" is reported as this attempt's own completion.

use serde::Serialize;

use crate::{
    api::{ApiError, FinishRequest, FinishResponse},
    ids::{IdempotencyKey, SessionId},
    model::QuizResult,
};

/// What asked for the attempt to end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FinishTrigger {
    /// The countdown reached zero
    Timeout,
    /// The answer to the last question was settled
    LastQuestion,
    /// The participant submitted early
    Manual,
    /// An external signal ended the attempt
    ForceExit,
}

/// Terminal outcome of an attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FinishOutcome {
    /// This client's request closed the session
    Success(QuizResult),
    /// An earlier request of this attempt closed the session but its reply
    /// was lost; the score has to be looked up
    Recovered {
        /// Message from the server, if any
        message: String,
    },
    /// The session had already been closed, e.g. from another tab
    AlreadySubmitted {
        /// Message from the server, if any
        message: String,
    },
}

/// Result of settling a finish request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The attempt is over
    Finished(FinishOutcome),
    /// The request failed; the latch is released so it can be retried
    Retryable(ApiError),
}

/// Latched authority over the single finish request of a session
#[derive(Debug, Clone)]
pub struct FinishCoordinator {
    session_id: SessionId,
    idempotency_key: IdempotencyKey,
    latched: bool,
    trigger: Option<FinishTrigger>,
    violation_count: u32,
    outcome: Option<FinishOutcome>,
    attempts: u32,
    maybe_delivered: bool,
}

impl FinishCoordinator {
    /// Creates an unlatched coordinator for one session
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            idempotency_key: IdempotencyKey::new(),
            latched: false,
            trigger: None,
            violation_count: 0,
            outcome: None,
            attempts: 0,
            maybe_delivered: false,
        }
    }

    /// Whether a request is in flight or the attempt is over
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// The terminal outcome, once known
    pub fn outcome(&self) -> Option<&FinishOutcome> {
        self.outcome.as_ref()
    }

    /// The trigger that won the latch
    pub fn trigger(&self) -> Option<FinishTrigger> {
        self.trigger
    }

    /// How many finish requests were issued
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Latches and returns the request to send
    ///
    /// Returns `None` when a request is already in flight or the attempt is
    /// over. The first trigger is kept across retries.
    ///
    /// # Arguments
    ///
    /// * `trigger` - What asked for the attempt to end
    /// * `violation_count` - Integrity violations to report
    pub fn begin(&mut self, trigger: FinishTrigger, violation_count: u32) -> Option<FinishRequest> {
        if self.latched {
            tracing::debug!(?trigger, "finish already latched");
            return None;
        }
        self.latched = true;
        self.trigger.get_or_insert(trigger);
        self.violation_count = violation_count;
        Some(self.request())
    }

    /// Re-issues the request after a failure, with the same idempotency key
    pub fn retry(&mut self) -> Option<FinishRequest> {
        let trigger = self.trigger?;
        self.begin(trigger, self.violation_count)
    }

    /// Settles the in-flight request
    ///
    /// Returns `None` when no request was in flight.
    pub fn complete(&mut self, response: Result<FinishResponse, ApiError>) -> Option<Completion> {
        if !self.latched || self.outcome.is_some() {
            return None;
        }
        match response {
            Ok(FinishResponse::Finished(result)) => Some(self.settle(FinishOutcome::Success(result))),
            Ok(FinishResponse::Duplicate { message }) if self.maybe_delivered => {
                tracing::info!(
                    session_id = %self.session_id,
                    "an earlier finish request closed the session"
                );
                Some(self.settle(FinishOutcome::Recovered { message }))
            }
            Ok(FinishResponse::Duplicate { message }) => {
                tracing::info!(session_id = %self.session_id, "session was already finished");
                Some(self.settle(FinishOutcome::AlreadySubmitted { message }))
            }
            Err(error) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    %error,
                    may_have_applied = error.may_have_applied(),
                    "finish failed"
                );
                self.maybe_delivered |= error.may_have_applied();
                self.latched = false;
                Some(Completion::Retryable(error))
            }
        }
    }

    fn settle(&mut self, outcome: FinishOutcome) -> Completion {
        self.outcome = Some(outcome.clone());
        Completion::Finished(outcome)
    }

    fn request(&mut self) -> FinishRequest {
        self.attempts += 1;
        FinishRequest {
            session_id: self.session_id,
            violation_count: self.violation_count,
            idempotency_key: self.idempotency_key,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn coordinator() -> FinishCoordinator {
        FinishCoordinator::new(SessionId::from(9))
    }

    #[test]
    fn test_second_trigger_issues_nothing() {
        let mut finish = coordinator();

        let request = finish.begin(FinishTrigger::Manual, 2).unwrap();
        assert_eq!(request.violation_count, 2);
        assert!(finish.begin(FinishTrigger::Timeout, 2).is_none());

        assert_eq!(finish.attempts(), 1);
        assert_eq!(finish.trigger(), Some(FinishTrigger::Manual));
    }

    #[test]
    fn test_success_stays_latched() {
        let mut finish = coordinator();
        finish.begin(FinishTrigger::LastQuestion, 0);

        let completion = finish.complete(Ok(FinishResponse::Finished(QuizResult::default())));

        assert_eq!(
            completion,
            Some(Completion::Finished(FinishOutcome::Success(QuizResult::default())))
        );
        assert!(finish.is_latched());
        assert!(finish.begin(FinishTrigger::Timeout, 0).is_none());
        assert!(finish.retry().is_none());
    }

    #[test]
    fn test_duplicate_is_already_submitted() {
        let mut finish = coordinator();
        finish.begin(FinishTrigger::Timeout, 1);

        let completion = finish.complete(Ok(FinishResponse::Duplicate {
            message: "Test already submitted".to_owned(),
        }));

        assert!(matches!(
            completion,
            Some(Completion::Finished(FinishOutcome::AlreadySubmitted { .. }))
        ));
    }

    #[test]
    fn test_failure_releases_latch_and_retry_reuses_key() {
        let mut finish = coordinator();
        let first = finish.begin(FinishTrigger::Manual, 3).unwrap();

        let completion = finish.complete(Err(ApiError::unreachable("offline")));
        assert!(matches!(completion, Some(Completion::Retryable(_))));
        assert!(!finish.is_latched());

        let second = finish.retry().unwrap();
        assert_eq!(second, first);
        assert_eq!(finish.attempts(), 2);
        assert!(finish.retry().is_none());
    }

    #[test]
    fn test_complete_without_request_is_ignored() {
        let mut finish = coordinator();
        assert_eq!(
            finish.complete(Ok(FinishResponse::Finished(QuizResult::default()))),
            None
        );
        assert!(finish.retry().is_none());
    }

    #[test]
    fn test_lost_response_retry_is_recovered() {
        let mut finish = coordinator();
        finish.begin(FinishTrigger::Manual, 0);
        finish.complete(Err(ApiError::Transport {
            message: "connection reset".to_owned(),
            reached_server: true,
        }));
        finish.retry();

        let completion = finish.complete(Ok(FinishResponse::Duplicate {
            message: "Already finished".to_owned(),
        }));

        assert_eq!(
            completion,
            Some(Completion::Finished(FinishOutcome::Recovered {
                message: "Already finished".to_owned()
            }))
        );
    }

    #[test]
    fn test_undelivered_retry_duplicate_is_already_submitted() {
        let mut finish = coordinator();
        finish.begin(FinishTrigger::Manual, 0);
        finish.complete(Err(ApiError::unreachable("connection refused")));
        finish.retry();

        let completion = finish.complete(Ok(FinishResponse::Duplicate {
            message: "Already finished".to_owned(),
        }));

        assert!(matches!(
            completion,
            Some(Completion::Finished(FinishOutcome::AlreadySubmitted { .. }))
        ));
    }
}
