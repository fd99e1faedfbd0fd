//! Quiz session controller
//!
//! [`QuizController`] owns everything about one live attempt: the countdown,
//! the integrity monitor, the answer recorder and the finish coordinator.
//! It performs no I/O itself. Server calls leave through the [`Tunnel`] as
//! [`Request`]s and their replies come back through the `receive_*`
//! methods; time-based work is scheduled as alarms and delivered back
//! through [`QuizController::receive_alarm`]. Only one input is handled at a
//! time, which is what makes the finish latch sufficient without locks.
//!
//! ```text
//! Loading -> Active <-> Warning
//!              |           |
//!              v           v
//!           Submitting -> Finished(Success | AlreadySubmitted)
//! Loading -> Finished(AlreadySubmitted)
//! Loading | Active | Submitting -> Error (retryable)
//! ```

use garde::Validate;
use serde::Serialize;
use thiserror::Error;

use crate::{
    AlarmMessage,
    api::{ApiError, FinishResponse, PersistAnswerRequest, ResultResponse, SessionResponse},
    bootstrap::{self, ActiveAttempt, Bootstrap},
    config::{ConfigError, ControllerOptions},
    finish::{Completion, FinishCoordinator, FinishOutcome, FinishTrigger},
    ids::{OptionId, QuestionId, SessionId},
    integrity::{self, IntegrityMonitor, IntegrityOutcome},
    model::{Answer, Question, SessionMeta},
    platform::{Clock, LocalCache, Presentation, SessionCache},
    recorder::{self, AnswerRecorder, PersistFailure, Step},
    result::ResultWatcher,
    timer::{self, Countdown, TickOutcome},
    tunnel::{Request, Scheduler, Tunnel},
};

/// Which call failed when the controller is in [`State::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    /// Fetching the session and questions
    Bootstrap,
    /// Persisting an answer (only under the blocking persist policy)
    Persist,
    /// Finishing the session
    Finish,
}

/// How a finished attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Terminal {
    /// This client closed the session, possibly with a lost reply
    Success,
    /// The session had already been closed
    AlreadySubmitted,
}

/// States of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum State {
    /// Waiting for the session fetch
    Loading,
    /// Countdown running, input accepted
    Active,
    /// Countdown running, input blocked by the integrity overlay
    Warning,
    /// The finish request is in flight
    Submitting,
    /// The attempt is over
    Finished(Terminal),
    /// A call failed; [`QuizController::retry`] recovers
    Error(Stage),
}

/// Errors for operations the controller refuses
///
/// A refused operation never changes state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The operation is not valid in the current state
    #[error("not allowed while {0:?}")]
    NotActive(State),
    /// Input is blocked until the integrity warning is acknowledged
    #[error("the integrity warning must be acknowledged first")]
    WarningShowing,
    /// No integrity warning is showing
    #[error("no integrity warning to acknowledge")]
    NoWarning,
    /// The answer recorder refused the operation
    #[error(transparent)]
    Recorder(#[from] recorder::Error),
    /// The session fetch was already issued
    #[error("the session is already loading")]
    AlreadyStarted,
    /// There is no failed call to retry
    #[error("nothing to retry")]
    NothingToRetry,
    /// The controller was torn down
    #[error("the controller was torn down")]
    TornDown,
}

/// What the attempt amounted to, for the result screen and the administrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptSummary {
    /// Session identifier
    pub session_id: SessionId,
    /// Questions whose answers the server acknowledged
    pub answered: Vec<QuestionId>,
    /// Questions whose answers were given up after failed persists
    pub lost: Vec<QuestionId>,
    /// Integrity violations reported at finish
    pub violation_count: u32,
    /// What ended the attempt, once it ended
    pub trigger: Option<FinishTrigger>,
}

/// Update messages sent to the participant by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UpdateMessage {
    /// The controller moved to a new state
    StateChanged(State),
    /// The attempt is over
    Finished {
        /// Outcome, with the score payload on success
        outcome: FinishOutcome,
        /// Summary of the attempt, absent when it was never active here
        summary: Option<AttemptSummary>,
    },
    /// A call failed and can be retried
    Error {
        /// Which call failed
        stage: Stage,
        /// Description of the failure
        message: String,
    },
}

#[derive(Debug)]
struct Attempt {
    meta: SessionMeta,
    countdown: Countdown,
    monitor: IntegrityMonitor,
    recorder: AnswerRecorder,
    finish: FinishCoordinator,
}

impl Attempt {
    fn persist_request(&self, answer: Answer) -> PersistAnswerRequest {
        PersistAnswerRequest {
            session_id: self.meta.id,
            question_id: answer.question_id,
            selected_option: answer.option_id,
            time_spent_seconds: answer.time_spent_seconds,
        }
    }
}

/// The state machine of one participant's attempt
///
/// # Type Parameters
///
/// * `P` - Full-screen presentation control
/// * `K` - Client-local cache surviving a reload
/// * `C` - Source of the current time
#[derive(Debug)]
pub struct QuizController<P, K, C> {
    presentation: P,
    cache: SessionCache<K>,
    clock: C,
    options: ControllerOptions,
    state: State,
    fetching: bool,
    torn_down: bool,
    attempt: Option<Attempt>,
    result: ResultWatcher,
    outcome: Option<FinishOutcome>,
    last_error: Option<ApiError>,
}

impl<P: Presentation, K: LocalCache, C: Clock> QuizController<P, K, C> {
    /// Creates a controller in the loading state
    ///
    /// # Arguments
    ///
    /// * `presentation` - Full-screen control
    /// * `cache` - Client-local cache holding the session keys
    /// * `clock` - Current time
    /// * `options` - Timing and policy settings
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if an option is out of range.
    pub fn new(
        presentation: P,
        cache: K,
        clock: C,
        options: ControllerOptions,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            presentation,
            cache: SessionCache::new(cache),
            clock,
            result: ResultWatcher::new(options.result_poll_interval),
            options,
            state: State::Loading,
            fetching: false,
            torn_down: false,
            attempt: None,
            outcome: None,
            last_error: None,
        })
    }

    /// Current state
    pub fn state(&self) -> State {
        self.state
    }

    /// Settings in use
    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Identifier of the session, once bootstrapped
    pub fn session_id(&self) -> Option<SessionId> {
        self.attempt.as_ref().map(|attempt| attempt.meta.id)
    }

    /// Remaining whole seconds, recomputed from the authoritative start time
    pub fn remaining_seconds(&self) -> u64 {
        self.attempt.as_ref().map_or(0, |attempt| {
            attempt.countdown.remaining_seconds(self.clock.now())
        })
    }

    /// The question currently shown
    pub fn current_question(&self) -> Option<&Question> {
        self.attempt.as_ref()?.recorder.current()
    }

    /// Index of the question currently shown
    pub fn question_index(&self) -> Option<usize> {
        self.attempt.as_ref().map(|attempt| attempt.recorder.pointer())
    }

    /// Integrity violations counted so far
    pub fn violation_count(&self) -> u32 {
        self.attempt
            .as_ref()
            .map_or(0, |attempt| attempt.monitor.violation_count())
    }

    /// The terminal outcome, once finished
    pub fn outcome(&self) -> Option<&FinishOutcome> {
        self.outcome.as_ref()
    }

    /// The error behind the current [`State::Error`]
    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    /// Summary of the attempt so far
    pub fn summary(&self) -> Option<AttemptSummary> {
        let attempt = self.attempt.as_ref()?;
        Some(AttemptSummary {
            session_id: attempt.meta.id,
            answered: attempt.recorder.answered_ids(),
            lost: attempt.recorder.lost_ids(),
            violation_count: attempt.monitor.violation_count(),
            trigger: attempt.finish.trigger(),
        })
    }

    /// Issues the session fetch
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] unless loading with no fetch issued.
    pub fn start<T: Tunnel>(&mut self, tunnel: &T) -> Result<(), Error> {
        self.ensure_live()?;
        if self.state != State::Loading || self.fetching {
            return Err(Error::AlreadyStarted);
        }
        self.fetching = true;
        tunnel.send_request(Request::FetchSession);
        Ok(())
    }

    /// Handles the reply of the session fetch
    ///
    /// # Arguments
    ///
    /// * `response` - Typed reply, or the error of the call
    /// * `tunnel` - Where updates are sent
    /// * `scheduler` - Where the countdown and integrity alarms are scheduled
    pub fn receive_session<T: Tunnel, S: Scheduler>(
        &mut self,
        response: Result<SessionResponse, ApiError>,
        tunnel: &T,
        scheduler: &mut S,
    ) {
        if self.torn_down || !self.fetching {
            return;
        }
        self.fetching = false;

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                self.fail(Stage::Bootstrap, error, tunnel);
                return;
            }
        };

        match bootstrap::interpret(response, &self.cache, self.clock.now()) {
            Bootstrap::Active(attempt) => self.enter_active(attempt, tunnel, scheduler),
            Bootstrap::AlreadySubmitted { message, .. } => {
                self.enter_finished(FinishOutcome::AlreadySubmitted { message }, tunnel, scheduler);
            }
        }
    }

    /// Stores the pending choice for the current question
    ///
    /// # Errors
    ///
    /// Fails outside the active state and for options the recorder refuses.
    pub fn select<T: Tunnel>(&mut self, option: OptionId, tunnel: &T) -> Result<(), Error> {
        let attempt = self.active_attempt()?;
        attempt.recorder.select(option)?;
        if let Some(view) = attempt.recorder.view() {
            tunnel.send_update(&view.into());
        }
        Ok(())
    }

    /// Persists the pending choice; the pointer moves once the persist settles
    ///
    /// # Errors
    ///
    /// Fails outside the active state, without a pending choice, and while a
    /// previous advance is unsettled.
    pub fn advance<T: Tunnel>(&mut self, tunnel: &T) -> Result<(), Error> {
        let now = self.clock.now();
        let attempt = self.active_attempt()?;
        let answer = attempt.recorder.advance(now)?;
        let request = attempt.persist_request(answer);

        tunnel.send_update(
            &recorder::UpdateMessage::Saving {
                question_id: request.question_id,
            }
            .into(),
        );
        tunnel.send_request(Request::PersistAnswer(request));
        Ok(())
    }

    /// Moves back one question without persisting anything
    ///
    /// # Errors
    ///
    /// Fails outside the active state, on the first question, and while an
    /// advance is unsettled.
    pub fn back<T: Tunnel>(&mut self, tunnel: &T) -> Result<(), Error> {
        let now = self.clock.now();
        let attempt = self.active_attempt()?;
        attempt.recorder.back(now)?;
        if let Some(view) = attempt.recorder.view() {
            tunnel.send_update(&view.into());
        }
        Ok(())
    }

    /// Submits the attempt early
    ///
    /// # Errors
    ///
    /// Fails unless active (or stalled on a persist failure).
    pub fn submit<T: Tunnel, S: Scheduler>(
        &mut self,
        tunnel: &T,
        scheduler: &mut S,
    ) -> Result<(), Error> {
        self.ensure_live()?;
        match self.state {
            State::Active | State::Error(Stage::Persist) => {}
            State::Warning => return Err(Error::WarningShowing),
            state => return Err(Error::NotActive(state)),
        }
        self.finish(FinishTrigger::Manual, tunnel, scheduler);
        Ok(())
    }

    /// Ends the attempt on an external signal
    ///
    /// A finish already in flight is left alone.
    ///
    /// # Errors
    ///
    /// Fails when there is no attempt or it is already finished.
    pub fn force_exit<T: Tunnel, S: Scheduler>(
        &mut self,
        tunnel: &T,
        scheduler: &mut S,
    ) -> Result<(), Error> {
        self.ensure_live()?;
        if self.attempt.is_none() || matches!(self.state, State::Finished(_)) {
            return Err(Error::NotActive(self.state));
        }
        self.finish(FinishTrigger::ForceExit, tunnel, scheduler);
        Ok(())
    }

    /// Handles the reply of a persist-answer call
    pub fn receive_persist<T: Tunnel, S: Scheduler>(
        &mut self,
        response: Result<(), ApiError>,
        tunnel: &T,
        scheduler: &mut S,
    ) {
        if self.torn_down {
            return;
        }
        let now = self.clock.now();
        let policy = self.options.persist_failure_policy;
        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };
        let Some(question_id) = attempt.recorder.in_flight().map(|answer| answer.question_id)
        else {
            return;
        };

        let step = match &response {
            Ok(()) => attempt.recorder.persist_succeeded(now),
            Err(ApiError::Rejected { message }) => attempt.recorder.persist_failed(
                &PersistFailure::Rejected(message.clone()),
                policy,
                now,
            ),
            Err(error) => attempt.recorder.persist_failed(
                &PersistFailure::Transport(error.to_string()),
                policy,
                now,
            ),
        };
        let Some(step) = step else {
            return;
        };
        let view = attempt.recorder.view();

        match (step, response) {
            (Step::Frozen, _) => {}
            (Step::Blocked, Err(ApiError::Rejected { message })) => {
                tracing::warn!(%question_id, %message, "answer rejected");
                tunnel.send_update(
                    &recorder::UpdateMessage::AnswerRejected {
                        question_id,
                        reason: message,
                    }
                    .into(),
                );
                if let Some(view) = view {
                    tunnel.send_update(&view.into());
                }
            }
            (Step::Blocked, Err(error)) => self.fail(Stage::Persist, error, tunnel),
            (step, response) => {
                if let Err(error) = response {
                    tracing::warn!(%question_id, %error, "answer not saved, moving on");
                    tunnel.send_update(
                        &recorder::UpdateMessage::AnswerNotSaved {
                            question_id,
                            reason: error.to_string(),
                        }
                        .into(),
                    );
                }
                match step {
                    Step::Moved(_) => {
                        if let Some(view) = view {
                            tunnel.send_update(&view.into());
                        }
                    }
                    Step::Exhausted => self.finish(FinishTrigger::LastQuestion, tunnel, scheduler),
                    Step::Blocked | Step::Frozen => {}
                }
            }
        }
    }

    /// Handles the reply of the finish call
    ///
    /// Discarded after [`QuizController::teardown`].
    pub fn receive_finish<T: Tunnel, S: Scheduler>(
        &mut self,
        response: Result<FinishResponse, ApiError>,
        tunnel: &T,
        scheduler: &mut S,
    ) {
        if self.torn_down {
            tracing::debug!("discarding finish reply after teardown");
            return;
        }
        let Some(completion) = self
            .attempt
            .as_mut()
            .and_then(|attempt| attempt.finish.complete(response))
        else {
            return;
        };
        match completion {
            Completion::Finished(outcome) => self.enter_finished(outcome, tunnel, scheduler),
            Completion::Retryable(error) => self.fail(Stage::Finish, error, tunnel),
        }
    }

    /// Re-issues the call behind the current error state
    ///
    /// A finish retry reuses the idempotency key of the failed request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NothingToRetry`] outside the error state.
    pub fn retry<T: Tunnel>(&mut self, tunnel: &T) -> Result<(), Error> {
        self.ensure_live()?;
        match self.state {
            State::Error(Stage::Bootstrap) => {
                self.fetching = true;
                self.set_state(State::Loading, tunnel);
                tunnel.send_request(Request::FetchSession);
            }
            State::Error(Stage::Persist) => {
                let attempt = self.attempt.as_ref().ok_or(Error::NothingToRetry)?;
                let answer = attempt
                    .recorder
                    .retry_in_flight()
                    .ok_or(Error::NothingToRetry)?;
                let request = attempt.persist_request(answer);
                let resumed = if attempt.monitor.overlay_visible() {
                    State::Warning
                } else {
                    State::Active
                };
                self.set_state(resumed, tunnel);
                tunnel.send_update(
                    &recorder::UpdateMessage::Saving {
                        question_id: request.question_id,
                    }
                    .into(),
                );
                tunnel.send_request(Request::PersistAnswer(request));
            }
            State::Error(Stage::Finish) => {
                let request = self
                    .attempt
                    .as_mut()
                    .and_then(|attempt| attempt.finish.retry())
                    .ok_or(Error::NothingToRetry)?;
                self.set_state(State::Submitting, tunnel);
                tunnel.send_request(Request::Finish(request));
            }
            _ => return Err(Error::NothingToRetry),
        }
        self.last_error = None;
        Ok(())
    }

    /// Handles a visibility change of the page
    pub fn visibility_changed<T: Tunnel>(&mut self, hidden: bool, tunnel: &T) {
        if self.torn_down {
            return;
        }
        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };
        if let IntegrityOutcome::Violation { count } =
            attempt.monitor.visibility_changed(hidden, &self.presentation)
        {
            tunnel.send_update(
                &integrity::UpdateMessage::Warning {
                    violation_count: count,
                }
                .into(),
            );
            if self.state == State::Active {
                self.set_state(State::Warning, tunnel);
            }
        }
    }

    /// Handles a full-screen change of the page
    pub fn fullscreen_changed<S: Scheduler>(&mut self, fullscreen: bool, scheduler: &mut S) {
        if self.torn_down {
            return;
        }
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.monitor.fullscreen_changed(fullscreen, scheduler);
        }
    }

    /// Dismisses the integrity overlay and re-enters full-screen
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoWarning`] when no overlay is showing.
    pub fn acknowledge_warning<T: Tunnel>(&mut self, tunnel: &T) -> Result<(), Error> {
        self.ensure_live()?;
        let attempt = self.attempt.as_mut().ok_or(Error::NoWarning)?;
        if !attempt.monitor.acknowledge(&self.presentation) {
            return Err(Error::NoWarning);
        }
        tunnel.send_update(&integrity::UpdateMessage::WarningDismissed.into());
        if self.state == State::Warning {
            self.set_state(State::Active, tunnel);
        }
        Ok(())
    }

    /// Handles an alarm scheduled earlier
    pub fn receive_alarm<T: Tunnel, S: Scheduler>(
        &mut self,
        alarm: AlarmMessage,
        tunnel: &T,
        scheduler: &mut S,
    ) {
        if self.torn_down {
            return;
        }
        match alarm {
            AlarmMessage::Countdown(timer::AlarmMessage::Tick) => {
                let now = self.clock.now();
                if let Some(outcome) = self
                    .attempt
                    .as_mut()
                    .and_then(|attempt| attempt.countdown.tick(now, scheduler))
                {
                    self.on_tick(outcome, tunnel, scheduler);
                }
            }
            AlarmMessage::Integrity(alarm) => {
                if let Some(attempt) = self.attempt.as_mut() {
                    attempt.monitor.receive_alarm(alarm, &self.presentation);
                }
            }
            AlarmMessage::Result(alarm) => self.result.receive_alarm(alarm, tunnel),
        }
    }

    /// Starts polling for the publication of the result
    ///
    /// # Errors
    ///
    /// Fails unless the attempt is finished.
    pub fn watch_result<T: Tunnel>(&mut self, tunnel: &T) -> Result<(), Error> {
        self.ensure_live()?;
        if !matches!(self.state, State::Finished(_)) {
            return Err(Error::NotActive(self.state));
        }
        self.result.start(tunnel);
        Ok(())
    }

    /// Handles the reply of a result lookup
    pub fn receive_result<T: Tunnel, S: Scheduler>(
        &mut self,
        response: Result<ResultResponse, ApiError>,
        tunnel: &T,
        scheduler: &mut S,
    ) {
        if self.torn_down {
            return;
        }
        self.result.receive_result(response, tunnel, scheduler);
    }

    /// Releases every alarm; later inputs are ignored
    pub fn teardown<S: Scheduler>(&mut self, scheduler: &mut S) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        scheduler.cancel_all();
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.countdown.stop();
            attempt.monitor.stop();
            attempt.recorder.freeze();
        }
        self.result.stop();
        tracing::debug!(session_id = ?self.session_id(), state = ?self.state, "controller torn down");
    }

    fn ensure_live(&self) -> Result<(), Error> {
        if self.torn_down {
            Err(Error::TornDown)
        } else {
            Ok(())
        }
    }

    fn active_attempt(&mut self) -> Result<&mut Attempt, Error> {
        self.ensure_live()?;
        match self.state {
            State::Active => {}
            State::Warning => return Err(Error::WarningShowing),
            state => return Err(Error::NotActive(state)),
        }
        self.attempt.as_mut().ok_or(Error::NotActive(self.state))
    }

    fn set_state<T: Tunnel>(&mut self, state: State, tunnel: &T) {
        if self.state == state {
            return;
        }
        tracing::debug!(
            session_id = ?self.session_id(),
            from = ?self.state,
            to = ?state,
            "state transition"
        );
        self.state = state;
        tunnel.send_update(&UpdateMessage::StateChanged(state).into());
    }

    fn fail<T: Tunnel>(&mut self, stage: Stage, error: ApiError, tunnel: &T) {
        tracing::warn!(?stage, %error, "call failed");
        tunnel.send_update(
            &UpdateMessage::Error {
                stage,
                message: error.to_string(),
            }
            .into(),
        );
        self.last_error = Some(error);
        self.set_state(State::Error(stage), tunnel);
    }

    fn enter_active<T: Tunnel, S: Scheduler>(
        &mut self,
        active: ActiveAttempt,
        tunnel: &T,
        scheduler: &mut S,
    ) {
        if let Err(error) = self.presentation.request_fullscreen() {
            tracing::debug!(%error, "full-screen request refused");
        }

        let now = self.clock.now();
        let mut attempt = Attempt {
            countdown: Countdown::new(active.meta.start_time, active.meta.duration),
            monitor: IntegrityMonitor::new(
                self.options.grace_period,
                self.options.fullscreen_retry_delay,
            ),
            recorder: AnswerRecorder::new(active.questions, now),
            finish: FinishCoordinator::new(active.meta.id),
            meta: active.meta,
        };
        let first_tick = attempt.countdown.start(now, scheduler);
        attempt.monitor.activate(scheduler);
        let view = attempt.recorder.view();
        self.attempt = Some(attempt);

        self.set_state(State::Active, tunnel);
        if let Some(view) = view {
            tunnel.send_update(&view.into());
        }
        self.on_tick(first_tick, tunnel, scheduler);
    }

    fn on_tick<T: Tunnel, S: Scheduler>(
        &mut self,
        outcome: TickOutcome,
        tunnel: &T,
        scheduler: &mut S,
    ) {
        tunnel.send_update(&outcome.to_update().into());
        if outcome == TickOutcome::Expired {
            self.finish(FinishTrigger::Timeout, tunnel, scheduler);
        }
    }

    fn finish<T: Tunnel, S: Scheduler>(
        &mut self,
        trigger: FinishTrigger,
        tunnel: &T,
        scheduler: &mut S,
    ) {
        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };
        let Some(request) = attempt
            .finish
            .begin(trigger, attempt.monitor.violation_count())
        else {
            return;
        };
        attempt.countdown.stop();
        attempt.monitor.stop();
        attempt.recorder.freeze();
        scheduler.cancel_all();

        tracing::info!(
            session_id = %request.session_id,
            ?trigger,
            violation_count = request.violation_count,
            "finishing session"
        );
        self.set_state(State::Submitting, tunnel);
        tunnel.send_request(Request::Finish(request));
    }

    fn enter_finished<T: Tunnel, S: Scheduler>(
        &mut self,
        outcome: FinishOutcome,
        tunnel: &T,
        scheduler: &mut S,
    ) {
        let terminal = match outcome {
            FinishOutcome::Success(_) | FinishOutcome::Recovered { .. } => Terminal::Success,
            FinishOutcome::AlreadySubmitted { .. } => Terminal::AlreadySubmitted,
        };
        let look_up_score = matches!(outcome, FinishOutcome::Recovered { .. });
        self.cache.clear();
        if self.presentation.is_fullscreen() {
            self.presentation.exit_fullscreen();
        }
        scheduler.cancel_all();
        self.last_error = None;
        self.outcome = Some(outcome.clone());

        self.set_state(State::Finished(terminal), tunnel);
        tunnel.send_update(
            &UpdateMessage::Finished {
                outcome,
                summary: self.summary(),
            }
            .into(),
        );
        if look_up_score {
            self.result.start(tunnel);
        }
    }
}
