//! Countdown timer anchored to the server's start time
//!
//! The remaining time is always derived from the authoritative start time
//! and the session duration, never accumulated locally, so neither a reload
//! nor a throttled background tab can stretch the attempt.

use serde::{Deserialize, Serialize};
use web_time::{Duration, SystemTime};

use crate::{constants::countdown, tunnel::Scheduler};

/// Remaining whole seconds of a session
///
/// Computes `max(0, duration - elapsed_since(start_time))` with the elapsed
/// time floored to whole seconds. A start time in the future counts as no
/// time elapsed.
pub fn remaining_seconds(start_time: SystemTime, duration: Duration, now: SystemTime) -> u64 {
    let elapsed = now.duration_since(start_time).unwrap_or_default();
    duration.as_secs().saturating_sub(elapsed.as_secs())
}

/// Alarm messages for the countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// Time to recompute and emit the remaining seconds
    Tick,
}

/// How close the countdown is to zero, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    /// Plenty of time left
    Normal,
    /// Three minutes or less
    Caution,
    /// One minute or less
    Critical,
}

impl Urgency {
    /// Classifies a remaining-seconds value
    pub fn of(remaining_seconds: u64) -> Self {
        if remaining_seconds <= countdown::CRITICAL_THRESHOLD_SECONDS {
            Self::Critical
        } else if remaining_seconds <= countdown::CAUTION_THRESHOLD_SECONDS {
            Self::Caution
        } else {
            Self::Normal
        }
    }
}

/// Update messages sent to the participant by the countdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UpdateMessage {
    /// New remaining time
    Tick {
        /// Whole seconds left
        remaining_seconds: u64,
        /// Display urgency
        urgency: Urgency,
    },
    /// The countdown reached zero
    Expired,
}

/// Signal produced by a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The remaining time dropped to this value
    Remaining(u64),
    /// The remaining time reached zero; produced once
    Expired,
}

impl TickOutcome {
    /// The view update matching this outcome
    pub fn to_update(self) -> UpdateMessage {
        match self {
            Self::Remaining(remaining_seconds) => UpdateMessage::Tick {
                remaining_seconds,
                urgency: Urgency::of(remaining_seconds),
            },
            Self::Expired => UpdateMessage::Expired,
        }
    }
}

/// A 1 Hz countdown over one session
#[derive(Debug, Clone)]
pub struct Countdown {
    start_time: SystemTime,
    duration: Duration,
    last_emitted: Option<u64>,
    running: bool,
    expired: bool,
}

impl Countdown {
    /// Creates a stopped countdown
    ///
    /// # Arguments
    ///
    /// * `start_time` - The server's authoritative start time
    /// * `duration` - Total time allowed
    pub fn new(start_time: SystemTime, duration: Duration) -> Self {
        Self {
            start_time,
            duration,
            last_emitted: None,
            running: false,
            expired: false,
        }
    }

    /// Remaining whole seconds at `now`
    pub fn remaining_seconds(&self, now: SystemTime) -> u64 {
        remaining_seconds(self.start_time, self.duration, now)
    }

    /// Whether the expiry signal has been produced
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Whether ticks are still being scheduled
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Starts ticking and returns the initial value
    ///
    /// A session whose time is already up expires immediately.
    pub fn start<S: Scheduler>(&mut self, now: SystemTime, scheduler: &mut S) -> TickOutcome {
        self.running = true;
        match self.emit(now, scheduler) {
            Some(outcome) => outcome,
            None => TickOutcome::Remaining(self.remaining_seconds(now)),
        }
    }

    /// Handles a tick alarm
    ///
    /// Returns `None` once stopped or expired, and when the remaining time
    /// has not yet dropped below the last emitted value (an early timer).
    pub fn tick<S: Scheduler>(&mut self, now: SystemTime, scheduler: &mut S) -> Option<TickOutcome> {
        if !self.running || self.expired {
            return None;
        }
        self.emit(now, scheduler)
    }

    /// Stops ticking; later ticks produce nothing
    pub fn stop(&mut self) {
        self.running = false;
    }

    fn emit<S: Scheduler>(&mut self, now: SystemTime, scheduler: &mut S) -> Option<TickOutcome> {
        let remaining = self.remaining_seconds(now);

        if remaining == 0 {
            self.expired = true;
            self.running = false;
            self.last_emitted = Some(0);
            return Some(TickOutcome::Expired);
        }

        scheduler.schedule(AlarmMessage::Tick.into(), self.next_tick_delay(now));

        if self.last_emitted.is_some_and(|last| remaining >= last) {
            return None;
        }
        self.last_emitted = Some(remaining);
        Some(TickOutcome::Remaining(remaining))
    }

    /// Delay until the elapsed time crosses the next whole second
    fn next_tick_delay(&self, now: SystemTime) -> Duration {
        let interval = Duration::from_millis(countdown::TICK_INTERVAL_MILLIS);
        let into_second = now
            .duration_since(self.start_time)
            .map(|elapsed| Duration::from_nanos(u64::from(elapsed.subsec_nanos())))
            .unwrap_or_default();
        interval.saturating_sub(into_second).max(Duration::from_millis(1))
    }
}
