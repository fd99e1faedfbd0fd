//! Focus, visibility and full-screen monitoring
//!
//! The monitor starts disarmed. Requesting full-screen on activation often
//! causes a focus loss of its own, so violations are only counted once the
//! grace alarm has fired. Violations are recorded and reported at finish;
//! they never end the attempt locally.

use enum_map::{Enum, EnumMap};
use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::{
    platform::Presentation,
    tunnel::Scheduler,
};

/// Alarm messages for the integrity monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// The startup grace period is over
    GraceElapsed,
    /// Try to re-enter full-screen after an explicit exit
    ReenterFullscreen,
}

/// Update messages sent to the participant by the integrity monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UpdateMessage {
    /// Show the blocking acknowledgment overlay
    Warning {
        /// Violations recorded so far
        violation_count: u32,
    },
    /// The overlay was acknowledged
    WarningDismissed,
}

/// Platform signals the monitor observes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
pub enum Signal {
    /// The page became hidden
    Hidden,
    /// The page became visible again
    Visible,
    /// Full-screen was left without the page becoming hidden
    FullscreenExit,
}

/// What a visibility change amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityOutcome {
    /// Nothing to do: disarmed, inactive, or a repeated notification
    Ignored,
    /// A counted violation; the overlay should be shown
    Violation {
        /// Violations recorded so far
        count: u32,
    },
    /// The page is visible again and full-screen was re-requested
    Restore,
}

/// Observes one attempt's visibility and full-screen state
#[derive(Debug, Clone)]
pub struct IntegrityMonitor {
    grace_period: Duration,
    fullscreen_retry_delay: Duration,
    active: bool,
    armed: bool,
    hidden: bool,
    overlay: bool,
    violation_count: u32,
    observed: EnumMap<Signal, u32>,
}

impl IntegrityMonitor {
    /// Creates an inactive monitor
    ///
    /// # Arguments
    ///
    /// * `grace_period` - Time after activation during which hiding is not counted
    /// * `fullscreen_retry_delay` - Delay before re-entering full-screen after an explicit exit
    pub fn new(grace_period: Duration, fullscreen_retry_delay: Duration) -> Self {
        Self {
            grace_period,
            fullscreen_retry_delay,
            active: false,
            armed: false,
            hidden: false,
            overlay: false,
            violation_count: 0,
            observed: EnumMap::default(),
        }
    }

    /// Starts monitoring and schedules the end of the grace period
    pub fn activate<S: Scheduler>(&mut self, scheduler: &mut S) {
        self.active = true;
        self.armed = false;
        scheduler.schedule(AlarmMessage::GraceElapsed.into(), self.grace_period);
    }

    /// Stops monitoring; later notifications and alarms are ignored
    pub fn stop(&mut self) {
        self.active = false;
        self.armed = false;
        self.overlay = false;
    }

    /// Whether violations are currently counted
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Whether the acknowledgment overlay is showing
    pub fn overlay_visible(&self) -> bool {
        self.overlay
    }

    /// Violations counted so far
    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    /// How often a signal was observed while active, counted or not
    pub fn observed(&self, signal: Signal) -> u32 {
        self.observed[signal]
    }

    /// Handles one of the monitor's alarms
    pub fn receive_alarm<P: Presentation>(&mut self, alarm: AlarmMessage, presentation: &P) {
        if !self.active {
            return;
        }
        match alarm {
            AlarmMessage::GraceElapsed => {
                self.armed = true;
                tracing::debug!("integrity monitor armed");
            }
            AlarmMessage::ReenterFullscreen => {
                if !self.hidden && !presentation.is_fullscreen() {
                    request_silently(presentation);
                }
            }
        }
    }

    /// Handles a visibility change notification
    ///
    /// # Arguments
    ///
    /// * `hidden` - Whether the page is now hidden
    /// * `presentation` - Used to re-enter full-screen when the page is visible again
    pub fn visibility_changed<P: Presentation>(
        &mut self,
        hidden: bool,
        presentation: &P,
    ) -> IntegrityOutcome {
        if !self.active || hidden == self.hidden {
            return IntegrityOutcome::Ignored;
        }
        self.hidden = hidden;

        if hidden {
            self.observed[Signal::Hidden] += 1;
            if !self.armed {
                tracing::debug!("visibility lost during grace period");
                return IntegrityOutcome::Ignored;
            }
            self.violation_count += 1;
            self.overlay = true;
            tracing::warn!(violation_count = self.violation_count, "visibility lost");
            IntegrityOutcome::Violation {
                count: self.violation_count,
            }
        } else {
            self.observed[Signal::Visible] += 1;
            if !self.armed {
                return IntegrityOutcome::Ignored;
            }
            request_silently(presentation);
            IntegrityOutcome::Restore
        }
    }

    /// Handles a full-screen change notification
    ///
    /// Leaving full-screen while the page stays visible schedules a delayed
    /// re-entry; platforms refuse rapid repeated requests.
    pub fn fullscreen_changed<S: Scheduler>(&mut self, fullscreen: bool, scheduler: &mut S) {
        if !self.active || !self.armed || fullscreen || self.hidden {
            return;
        }
        self.observed[Signal::FullscreenExit] += 1;
        tracing::debug!("full-screen exited, scheduling re-entry");
        scheduler.schedule(
            AlarmMessage::ReenterFullscreen.into(),
            self.fullscreen_retry_delay,
        );
    }

    /// Dismisses the overlay and re-attempts full-screen
    ///
    /// Returns `false` when no overlay was showing.
    pub fn acknowledge<P: Presentation>(&mut self, presentation: &P) -> bool {
        if !self.overlay {
            return false;
        }
        self.overlay = false;
        request_silently(presentation);
        true
    }
}

fn request_silently<P: Presentation>(presentation: &P) {
    if let Err(error) = presentation.request_fullscreen() {
        tracing::debug!(%error, "full-screen re-entry refused");
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::testing::{FakePresentation, FakeScheduler};
    use web_time::SystemTime;

    fn monitor() -> IntegrityMonitor {
        IntegrityMonitor::new(Duration::from_secs(5), Duration::from_millis(300))
    }

    fn armed(scheduler: &mut FakeScheduler, presentation: &FakePresentation) -> IntegrityMonitor {
        let mut monitor = monitor();
        monitor.activate(scheduler);
        let (alarm, _) = scheduler.fire_next().unwrap();
        let crate::AlarmMessage::Integrity(alarm) = alarm else {
            panic!("Expected an integrity alarm");
        };
        monitor.receive_alarm(alarm, presentation);
        monitor
    }

    #[test]
    fn test_activate_schedules_grace_period() {
        let mut scheduler = FakeScheduler::new(SystemTime::UNIX_EPOCH);
        let mut monitor = monitor();

        monitor.activate(&mut scheduler);

        assert!(!monitor.is_armed());
        assert!(scheduler.has_pending(&AlarmMessage::GraceElapsed.into()));
    }

    #[test]
    fn test_hidden_during_grace_is_not_counted() {
        let presentation = FakePresentation::default();
        let mut scheduler = FakeScheduler::new(SystemTime::UNIX_EPOCH);
        let mut monitor = monitor();
        monitor.activate(&mut scheduler);

        let outcome = monitor.visibility_changed(true, &presentation);

        assert_eq!(outcome, IntegrityOutcome::Ignored);
        assert_eq!(monitor.violation_count(), 0);
        assert_eq!(monitor.observed(Signal::Hidden), 1);
        assert!(!monitor.overlay_visible());
    }

    #[test]
    fn test_hidden_after_grace_is_counted_and_shows_overlay() {
        let presentation = FakePresentation::default();
        let mut scheduler = FakeScheduler::new(SystemTime::UNIX_EPOCH);
        let mut monitor = armed(&mut scheduler, &presentation);

        assert_eq!(
            monitor.visibility_changed(true, &presentation),
            IntegrityOutcome::Violation { count: 1 }
        );
        assert!(monitor.overlay_visible());

        assert_eq!(
            monitor.visibility_changed(false, &presentation),
            IntegrityOutcome::Restore
        );
        assert_eq!(presentation.requests(), 1);

        monitor.visibility_changed(true, &presentation);
        assert_eq!(monitor.violation_count(), 2);
    }

    #[test]
    fn test_repeated_hidden_notification_counts_once() {
        let presentation = FakePresentation::default();
        let mut scheduler = FakeScheduler::new(SystemTime::UNIX_EPOCH);
        let mut monitor = armed(&mut scheduler, &presentation);

        monitor.visibility_changed(true, &presentation);
        assert_eq!(
            monitor.visibility_changed(true, &presentation),
            IntegrityOutcome::Ignored
        );
        assert_eq!(monitor.violation_count(), 1);
    }

    #[test]
    fn test_fullscreen_exit_schedules_delayed_reentry() {
        let presentation = FakePresentation::default();
        let mut scheduler = FakeScheduler::new(SystemTime::UNIX_EPOCH);
        let mut monitor = armed(&mut scheduler, &presentation);

        monitor.fullscreen_changed(false, &mut scheduler);

        assert_eq!(monitor.violation_count(), 0);
        assert_eq!(monitor.observed(Signal::FullscreenExit), 1);
        let before = scheduler.now();
        let (alarm, fired_at) = scheduler.fire_next().unwrap();
        assert_eq!(alarm, AlarmMessage::ReenterFullscreen.into());
        assert_eq!(
            fired_at.duration_since(before).unwrap(),
            Duration::from_millis(300)
        );

        monitor.receive_alarm(AlarmMessage::ReenterFullscreen, &presentation);
        assert_eq!(presentation.requests(), 1);
        assert!(presentation.is_fullscreen());
    }

    #[test]
    fn test_fullscreen_exit_while_hidden_is_left_to_visibility() {
        let presentation = FakePresentation::default();
        let mut scheduler = FakeScheduler::new(SystemTime::UNIX_EPOCH);
        let mut monitor = armed(&mut scheduler, &presentation);

        monitor.visibility_changed(true, &presentation);
        monitor.fullscreen_changed(false, &mut scheduler);

        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_reentry_alarm_skipped_when_hidden() {
        let presentation = FakePresentation::default();
        let mut scheduler = FakeScheduler::new(SystemTime::UNIX_EPOCH);
        let mut monitor = armed(&mut scheduler, &presentation);

        monitor.fullscreen_changed(false, &mut scheduler);
        monitor.visibility_changed(true, &presentation);
        monitor.receive_alarm(AlarmMessage::ReenterFullscreen, &presentation);

        assert_eq!(presentation.requests(), 0);
    }

    #[test]
    fn test_acknowledge_requests_fullscreen() {
        let presentation = FakePresentation::default();
        let mut scheduler = FakeScheduler::new(SystemTime::UNIX_EPOCH);
        let mut monitor = armed(&mut scheduler, &presentation);

        assert!(!monitor.acknowledge(&presentation));

        monitor.visibility_changed(true, &presentation);
        assert!(monitor.acknowledge(&presentation));
        assert!(!monitor.overlay_visible());
        assert_eq!(presentation.requests(), 1);
    }

    #[test]
    fn test_refused_reentry_is_not_an_error() {
        let presentation = FakePresentation::default();
        presentation.set_refuse(true);
        let mut scheduler = FakeScheduler::new(SystemTime::UNIX_EPOCH);
        let mut monitor = armed(&mut scheduler, &presentation);

        monitor.visibility_changed(true, &presentation);
        assert!(monitor.acknowledge(&presentation));
        assert!(!presentation.is_fullscreen());
    }

    #[test]
    fn test_stopped_monitor_ignores_everything() {
        let presentation = FakePresentation::default();
        let mut scheduler = FakeScheduler::new(SystemTime::UNIX_EPOCH);
        let mut monitor = armed(&mut scheduler, &presentation);

        monitor.stop();

        assert_eq!(
            monitor.visibility_changed(true, &presentation),
            IntegrityOutcome::Ignored
        );
        monitor.fullscreen_changed(false, &mut scheduler);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(monitor.violation_count(), 0);
    }
}
