//! Result publication watcher
//!
//! After an attempt is over the score may not be released yet. The watcher
//! asks for the result, and while it is unpublished (or the lookup fails)
//! asks again after the poll interval. Only one lookup is outstanding at a
//! time.

use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::{
    api::{ApiError, ResultResponse},
    model::QuizResult,
    tunnel::{Request, Scheduler, Tunnel},
};

/// Alarm messages for the result watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// Time to look the result up again
    Poll,
}

/// Update messages sent to the participant by the result watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UpdateMessage {
    /// The result has not been published yet
    Pending,
    /// The result is available
    Published(QuizResult),
}

/// Polls for the publication of a finished session's result
#[derive(Debug, Clone)]
pub struct ResultWatcher {
    interval: Duration,
    watching: bool,
    outstanding: bool,
    published: Option<QuizResult>,
    polls: u32,
}

impl ResultWatcher {
    /// Creates an idle watcher
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            watching: false,
            outstanding: false,
            published: None,
            polls: 0,
        }
    }

    /// Whether the watcher is still polling
    pub fn is_watching(&self) -> bool {
        self.watching
    }

    /// The published result, once known
    pub fn published(&self) -> Option<&QuizResult> {
        self.published.as_ref()
    }

    /// Lookups issued so far
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Starts polling with an immediate lookup
    pub fn start<T: Tunnel>(&mut self, tunnel: &T) {
        if self.watching || self.published.is_some() {
            return;
        }
        self.watching = true;
        self.poll(tunnel);
    }

    /// Stops polling; replies arriving later are ignored
    pub fn stop(&mut self) {
        self.watching = false;
    }

    /// Handles the poll alarm
    pub fn receive_alarm<T: Tunnel>(&mut self, alarm: AlarmMessage, tunnel: &T) {
        match alarm {
            AlarmMessage::Poll => {
                if self.watching && !self.outstanding {
                    self.poll(tunnel);
                }
            }
        }
    }

    /// Handles the reply of a lookup
    pub fn receive_result<T: Tunnel, S: Scheduler>(
        &mut self,
        response: Result<ResultResponse, ApiError>,
        tunnel: &T,
        scheduler: &mut S,
    ) {
        if !self.watching || !self.outstanding {
            return;
        }
        self.outstanding = false;

        match response {
            Ok(ResultResponse {
                published: true,
                result: Some(result),
            }) => {
                self.watching = false;
                tunnel.send_update(&UpdateMessage::Published(result.clone()).into());
                self.published = Some(result);
                return;
            }
            Ok(_) => {
                tunnel.send_update(&UpdateMessage::Pending.into());
            }
            Err(error) => {
                tracing::warn!(%error, "result lookup failed");
            }
        }
        scheduler.schedule(AlarmMessage::Poll.into(), self.interval);
    }

    fn poll<T: Tunnel>(&mut self, tunnel: &T) {
        self.outstanding = true;
        self.polls += 1;
        tunnel.send_request(Request::FetchResult);
    }
}
