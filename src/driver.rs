//! Native event loop
//!
//! [`Driver`] runs one [`QuizController`] on a single tokio task. Participant
//! events, alarm expiries and server replies all arrive on one channel and
//! are handled one at a time, so the controller never sees two inputs
//! interleaved. Server calls run as local tasks; persist and finish calls
//! are retried with bounded backoff before the controller hears of a
//! failure.
//!
//! The driver must run inside a [`tokio::task::LocalSet`]; [`Driver::run_local`]
//! provides one.
//!
//! On shutdown the controller is torn down first, then calls still in flight
//! are given [`Driver::with_drain_timeout`] to complete. Their replies are
//! dropped, but a finish request that already left is not cut off.

use std::{cell::RefCell, rc::Rc};

use thiserror::Error;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::{JoinSet, LocalSet},
};
use web_time::Duration;

use crate::{
    AlarmMessage, UpdateMessage,
    api::{ApiError, FinishResponse, LocalExamApi, ResultResponse, SessionResponse},
    constants::driver::DEFAULT_DRAIN_TIMEOUT_MILLIS,
    controller::{self, QuizController},
    ids::OptionId,
    platform::{Clock, LocalCache, Presentation},
    retry::{RetryConfig, retry_async},
    tunnel::{Request, Scheduler, Tunnel},
};

/// Participant and platform events fed to the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Choose an option for the current question
    Select(OptionId),
    /// Save the choice and move forward
    Advance,
    /// Move back one question
    Back,
    /// Submit early
    Submit,
    /// End the attempt on an external signal
    ForceExit,
    /// Retry the failed call
    Retry,
    /// Dismiss the integrity warning
    AcknowledgeWarning,
    /// Start polling for the published result
    WatchResult,
    /// The page was hidden (`true`) or shown again (`false`)
    VisibilityChanged(bool),
    /// Full-screen was entered (`true`) or left (`false`)
    FullscreenChanged(bool),
    /// Tear the controller down and stop the loop
    Shutdown,
}

#[derive(Debug)]
enum Reply {
    Session(Result<SessionResponse, ApiError>),
    Persist(Result<(), ApiError>),
    Finish(Result<FinishResponse, ApiError>),
    Result(Result<ResultResponse, ApiError>),
}

#[derive(Debug)]
enum Input {
    Event(Event),
    Alarm(AlarmMessage),
    Reply(Reply),
}

/// The driver loop has stopped
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("the driver has stopped")]
pub struct Stopped;

/// Sends events to a running [`Driver`]
#[derive(Debug, Clone)]
pub struct DriverHandle {
    sender: UnboundedSender<Input>,
}

impl DriverHandle {
    /// Queues an event
    ///
    /// # Errors
    ///
    /// Returns [`Stopped`] once the driver loop has ended.
    pub fn send(&self, event: Event) -> Result<(), Stopped> {
        self.sender.send(Input::Event(event)).map_err(|_| Stopped)
    }

    /// Asks the driver to tear down and stop
    pub fn shutdown(&self) {
        // A driver that already stopped needs no shutdown
        let _ = self.send(Event::Shutdown);
    }
}

/// Alarms as tokio sleeps; cancelling aborts every pending sleep
#[derive(Debug)]
struct TokioScheduler {
    sender: UnboundedSender<Input>,
    alarms: JoinSet<()>,
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, alarm: AlarmMessage, delay: Duration) {
        while self.alarms.try_join_next().is_some() {}
        let sender = self.sender.clone();
        self.alarms.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(Input::Alarm(alarm));
        });
    }

    fn cancel_all(&mut self) {
        self.alarms.abort_all();
    }
}

/// Runs requests as local tasks and forwards updates to the host
struct DriverTunnel<A> {
    api: Rc<A>,
    retry: RetryConfig,
    sender: UnboundedSender<Input>,
    updates: UnboundedSender<UpdateMessage>,
    requests: RefCell<JoinSet<()>>,
}

impl<A> DriverTunnel<A> {
    /// Waits up to `timeout` for the calls still in flight
    async fn drain(&self, timeout: Duration) {
        let mut requests = self.requests.take();
        if requests.is_empty() {
            return;
        }
        tracing::debug!(in_flight = requests.len(), "waiting for calls in flight");
        let drained = tokio::time::timeout(timeout, async {
            while requests.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                abandoned = requests.len(),
                "calls still in flight at shutdown"
            );
        }
    }
}

impl<A: LocalExamApi + 'static> Tunnel for DriverTunnel<A> {
    fn send_request(&self, request: Request) {
        let api = Rc::clone(&self.api);
        let retry = self.retry;
        let sender = self.sender.clone();
        let mut requests = self.requests.borrow_mut();
        while requests.try_join_next().is_some() {}
        requests.spawn_local(async move {
            let reply = match request {
                Request::FetchSession => Reply::Session(api.fetch_session().await),
                Request::PersistAnswer(request) => Reply::Persist(
                    retry_async(retry, ApiError::is_transient, || api.persist_answer(&request))
                        .await,
                ),
                Request::Finish(request) => Reply::Finish(
                    retry_async(retry, is_unsent, || api.finish(&request)).await,
                ),
                Request::FetchResult => Reply::Result(api.fetch_result().await),
            };
            if sender.send(Input::Reply(reply)).is_err() {
                tracing::debug!("driver stopped before the reply arrived");
            }
        });
    }

    fn send_update(&self, update: &UpdateMessage) {
        tracing::trace!(update = %update.to_message(), "update");
        let _ = self.updates.send(update.clone());
    }
}

/// A finish that may have closed the session is reported rather than
/// resent, so the controller can tell its own completion from a duplicate
fn is_unsent(error: &ApiError) -> bool {
    error.is_transient() && !error.may_have_applied()
}

/// Single-task event loop around one controller
pub struct Driver<A, P, K, C> {
    controller: QuizController<P, K, C>,
    tunnel: DriverTunnel<A>,
    scheduler: TokioScheduler,
    receiver: UnboundedReceiver<Input>,
    drain_timeout: Duration,
}

impl<A, P, K, C> Driver<A, P, K, C>
where
    A: LocalExamApi + 'static,
    P: Presentation,
    K: LocalCache,
    C: Clock,
{
    /// Creates a driver, the handle to feed it, and the stream of updates
    ///
    /// # Arguments
    ///
    /// * `api` - The exam server
    /// * `controller` - A controller in the loading state
    /// * `retry` - Retry bounds for persist and finish calls
    pub fn new(
        api: A,
        controller: QuizController<P, K, C>,
        retry: RetryConfig,
    ) -> (Self, DriverHandle, UnboundedReceiver<UpdateMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (updates, update_receiver) = mpsc::unbounded_channel();
        let driver = Self {
            controller,
            tunnel: DriverTunnel {
                api: Rc::new(api),
                retry,
                sender: sender.clone(),
                updates,
                requests: RefCell::new(JoinSet::new()),
            },
            scheduler: TokioScheduler {
                sender: sender.clone(),
                alarms: JoinSet::new(),
            },
            receiver,
            drain_timeout: Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MILLIS),
        };
        (driver, DriverHandle { sender }, update_receiver)
    }

    /// Sets how long shutdown waits for calls still in flight
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Runs the loop in a fresh [`LocalSet`]
    pub async fn run_local(self) {
        LocalSet::new().run_until(self.run()).await;
    }

    /// Bootstraps the controller and handles inputs until shutdown
    ///
    /// Must be polled inside a [`LocalSet`].
    pub async fn run(mut self) {
        if let Err(error) = self.controller.start(&self.tunnel) {
            tracing::warn!(%error, "controller did not start");
        }

        while let Some(input) = self.receiver.recv().await {
            match input {
                Input::Event(Event::Shutdown) => break,
                Input::Event(event) => self.handle_event(event),
                Input::Alarm(alarm) => {
                    self.controller
                        .receive_alarm(alarm, &self.tunnel, &mut self.scheduler);
                }
                Input::Reply(reply) => self.handle_reply(reply),
            }
        }

        self.controller.teardown(&mut self.scheduler);
        self.tunnel.drain(self.drain_timeout).await;
        tracing::debug!("driver stopped");
    }

    fn handle_event(&mut self, event: Event) {
        let tunnel = &self.tunnel;
        let scheduler = &mut self.scheduler;
        let controller = &mut self.controller;

        let result: Result<(), controller::Error> = match event {
            Event::Select(option) => controller.select(option, tunnel),
            Event::Advance => controller.advance(tunnel),
            Event::Back => controller.back(tunnel),
            Event::Submit => controller.submit(tunnel, scheduler),
            Event::ForceExit => controller.force_exit(tunnel, scheduler),
            Event::Retry => controller.retry(tunnel),
            Event::AcknowledgeWarning => controller.acknowledge_warning(tunnel),
            Event::WatchResult => controller.watch_result(tunnel),
            Event::VisibilityChanged(hidden) => {
                controller.visibility_changed(hidden, tunnel);
                Ok(())
            }
            Event::FullscreenChanged(fullscreen) => {
                controller.fullscreen_changed(fullscreen, scheduler);
                Ok(())
            }
            Event::Shutdown => Ok(()),
        };

        if let Err(error) = result {
            tracing::debug!(%error, "event refused");
        }
    }

    fn handle_reply(&mut self, reply: Reply) {
        let tunnel = &self.tunnel;
        let scheduler = &mut self.scheduler;
        match reply {
            Reply::Session(response) => {
                self.controller.receive_session(response, tunnel, scheduler);
            }
            Reply::Persist(response) => {
                self.controller.receive_persist(response, tunnel, scheduler);
            }
            Reply::Finish(response) => {
                self.controller.receive_finish(response, tunnel, scheduler);
            }
            Reply::Result(response) => {
                self.controller.receive_result(response, tunnel, scheduler);
            }
        }
    }
}
