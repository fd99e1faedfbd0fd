//! Outbound side of the controller
//!
//! The controller never performs I/O itself. Server calls and view updates
//! leave through a [`Tunnel`]; time-based work is handed to a [`Scheduler`]
//! which later feeds the [`AlarmMessage`] back into the controller. This keeps
//! the state machines deterministic under a fake clock and lets a host run
//! them on whatever event loop it has.

use web_time::Duration;

use crate::{
    AlarmMessage, UpdateMessage,
    api::{FinishRequest, PersistAnswerRequest},
};

/// A server call the controller wants performed
///
/// Each request is answered by calling the matching `receive_*` method on
/// the component that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Fetch the question set and session metadata
    FetchSession,
    /// Persist one answer
    PersistAnswer(PersistAnswerRequest),
    /// Finish the session
    Finish(FinishRequest),
    /// Fetch the result of a finished session
    FetchResult,
}

/// Trait for sending requests and view updates out of the controller
///
/// Implementations might issue HTTP calls and push updates to a UI channel,
/// or simply record everything for inspection in tests.
pub trait Tunnel {
    /// Hands a server call to the host
    ///
    /// # Arguments
    ///
    /// * `request` - The call to perform
    fn send_request(&self, request: Request);

    /// Sends a view update to the participant's screen
    ///
    /// # Arguments
    ///
    /// * `update` - The update message to send
    fn send_update(&self, update: &UpdateMessage);
}

/// Trait for delivering alarms back to the controller after a delay
///
/// All timers of one attempt go through a single scheduler so that teardown
/// is one [`Scheduler::cancel_all`] call.
pub trait Scheduler {
    /// Schedules `alarm` to be delivered after `delay`
    fn schedule(&mut self, alarm: AlarmMessage, delay: Duration);

    /// Cancels every alarm that has not been delivered yet
    fn cancel_all(&mut self);
}
