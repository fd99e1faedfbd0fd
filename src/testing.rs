//! Fakes shared by the unit tests: a manual clock, a scheduler that fires
//! alarms in due order while moving that clock, a tunnel that records
//! everything, and a scriptable full-screen capability.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use web_time::{Duration, SystemTime};

use crate::{
    AlarmMessage, UpdateMessage,
    platform::{Clock, Presentation, PresentationError},
    tunnel::{Request, Scheduler, Tunnel},
};

#[derive(Debug)]
pub struct ManualClock {
    now: Cell<SystemTime>,
}

impl ManualClock {
    pub fn new(now: SystemTime) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub fn set(&self, now: SystemTime) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        self.now.get()
    }
}

#[derive(Debug)]
pub struct FakeScheduler {
    clock: Rc<ManualClock>,
    queue: Vec<(SystemTime, u64, AlarmMessage)>,
    sequence: u64,
}

impl FakeScheduler {
    pub fn new(now: SystemTime) -> Self {
        Self::with_clock(Rc::new(ManualClock::new(now)))
    }

    pub fn with_clock(clock: Rc<ManualClock>) -> Self {
        Self {
            clock,
            queue: Vec::new(),
            sequence: 0,
        }
    }

    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn has_pending(&self, alarm: &AlarmMessage) -> bool {
        self.queue.iter().any(|(_, _, a)| a == alarm)
    }

    /// Pops the earliest alarm and moves the clock to its due time
    pub fn fire_next(&mut self) -> Option<(AlarmMessage, SystemTime)> {
        self.pop_due(None)
    }

    /// Pops the earliest alarm due at or before `deadline`
    pub fn pop_due(&mut self, deadline: Option<SystemTime>) -> Option<(AlarmMessage, SystemTime)> {
        let index = self
            .queue
            .iter()
            .enumerate()
            .filter(|(_, (due, _, _))| deadline.is_none_or(|d| *due <= d))
            .min_by_key(|(_, (due, seq, _))| (*due, *seq))
            .map(|(i, _)| i)?;
        let (due, _, alarm) = self.queue.remove(index);
        if due > self.clock.now() {
            self.clock.set(due);
        }
        Some((alarm, self.clock.now()))
    }
}

impl Scheduler for FakeScheduler {
    fn schedule(&mut self, alarm: AlarmMessage, delay: Duration) {
        self.sequence += 1;
        self.queue
            .push((self.clock.now() + delay, self.sequence, alarm));
    }

    fn cancel_all(&mut self) {
        self.queue.clear();
    }
}

#[derive(Debug, Default)]
pub struct RecordingTunnel {
    requests: RefCell<Vec<Request>>,
    updates: RefCell<Vec<UpdateMessage>>,
}

impl RecordingTunnel {
    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }

    pub fn take_requests(&self) -> Vec<Request> {
        self.requests.borrow_mut().drain(..).collect()
    }

    pub fn updates(&self) -> Vec<UpdateMessage> {
        self.updates.borrow().clone()
    }
}

impl Tunnel for RecordingTunnel {
    fn send_request(&self, request: Request) {
        self.requests.borrow_mut().push(request);
    }

    fn send_update(&self, update: &UpdateMessage) {
        self.updates.borrow_mut().push(update.clone());
    }
}

#[derive(Debug, Default)]
pub struct FakePresentation {
    fullscreen: Cell<bool>,
    refuse: Cell<bool>,
    requests: Cell<u32>,
    exits: Cell<u32>,
}

impl FakePresentation {
    pub fn requests(&self) -> u32 {
        self.requests.get()
    }

    pub fn exits(&self) -> u32 {
        self.exits.get()
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.set(refuse);
    }

    /// The participant leaves full-screen on their own, e.g. with Escape
    pub fn leave(&self) {
        self.fullscreen.set(false);
    }
}

impl Presentation for FakePresentation {
    fn request_fullscreen(&self) -> Result<(), PresentationError> {
        self.requests.set(self.requests.get() + 1);
        if self.refuse.get() {
            return Err(PresentationError::Refused("no user gesture".to_owned()));
        }
        self.fullscreen.set(true);
        Ok(())
    }

    fn exit_fullscreen(&self) {
        self.exits.set(self.exits.get() + 1);
        self.fullscreen.set(false);
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen.get()
    }
}
