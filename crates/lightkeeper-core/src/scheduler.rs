//! Background scheduler context: handshake replies and the periodic ticker.
//!
//! The context is split in two layers:
//!
//! - [`Scheduler`] -- a synchronous state machine that owns the tick counter
//!   and decides how to react to each inbound envelope. It never touches a
//!   clock, so its rules are testable without a runtime.
//! - [`run_scheduler`] / [`spawn_scheduler`] -- the receive loop that feeds
//!   envelopes to the state machine, installs the repeating timer on the first
//!   `start-command`, and forwards every timer fire as a `tick-event`.
//!
//! # State machine
//!
//! ```text
//! Created --(ready-query)--> AwaitingStart --(start-command)--> Running
//! ```
//!
//! Without the handshake the context is created directly in
//! `AwaitingStart`. `Running` is terminal. A second `start-command` is a
//! no-op: there is only ever one timer, so tick values stay gapless and
//! unique.

use std::time::Duration;

use lightkeeper_types::{ContextId, Direction, Envelope, Message};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;

/// Lower bound on the timer period; a zero period would spin.
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Errors that can occur in the scheduler context.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// A timer fire was requested before `start-command` arrived.
    #[error("timer fired while scheduler is {state:?}")]
    NotRunning {
        /// The state the scheduler was in.
        state: SchedulerState,
    },

    /// The scheduler task panicked or was aborted.
    #[error("scheduler task failed: {source}")]
    Task {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },
}

/// Lifecycle of a scheduler context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// Spawned, waiting for the controller's readiness query.
    Created,
    /// Handshake done (or skipped), waiting for `start-command`.
    AwaitingStart,
    /// Timer installed, emitting ticks. Terminal.
    Running,
}

/// What the receive loop must do after the state machine handled an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerAction {
    /// Send this message back to the controller.
    Reply(Message),
    /// Install the repeating timer.
    StartTimer,
    /// Nothing to do.
    Ignore,
}

/// Why a scheduler task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    /// [`SchedulerHandle::cancel`] was called.
    Cancelled,
    /// The controller side of the channel is gone.
    ControllerGone,
    /// The tick counter reached `u64::MAX`.
    CounterExhausted,
}

/// Scheduler state machine. Exclusively owns the tick counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduler {
    /// Identifier used to correlate log lines.
    id: ContextId,
    /// Current lifecycle state.
    state: SchedulerState,
    /// Number of ticks emitted so far. Starts at 0, never reset.
    tick: u64,
}

impl Scheduler {
    /// Create a scheduler. With `handshake` disabled it starts out
    /// [`SchedulerState::AwaitingStart`].
    pub fn new(handshake: bool) -> Self {
        let state = if handshake {
            SchedulerState::Created
        } else {
            SchedulerState::AwaitingStart
        };
        Self {
            id: ContextId::new(),
            state,
            tick: 0,
        }
    }

    /// Create a scheduler from explicit parts.
    pub const fn from_parts(id: ContextId, state: SchedulerState, tick: u64) -> Self {
        Self { id, state, tick }
    }

    /// Return the context identifier.
    pub const fn id(&self) -> ContextId {
        self.id
    }

    /// Return the current lifecycle state.
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Return the last emitted tick value (0 before the first tick).
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// React to one inbound envelope.
    ///
    /// Envelopes without a known topic, and topics addressed to the
    /// controller, are ignored without any state change.
    pub fn handle(&mut self, envelope: &Envelope) -> SchedulerAction {
        let Some(message) = Message::from_envelope(envelope) else {
            return SchedulerAction::Ignore;
        };
        if message.topic().direction() != Direction::ToScheduler {
            return SchedulerAction::Ignore;
        }

        match message {
            Message::ReadyQuery => {
                // Answered every time; never regresses a running context.
                if self.state == SchedulerState::Created {
                    self.state = SchedulerState::AwaitingStart;
                }
                SchedulerAction::Reply(Message::ReadyAck)
            }
            Message::StartCommand => {
                if self.state == SchedulerState::Running {
                    SchedulerAction::Ignore
                } else {
                    self.state = SchedulerState::Running;
                    SchedulerAction::StartTimer
                }
            }
            _ => SchedulerAction::Ignore,
        }
    }

    /// Handle one timer fire: increment the counter and build the
    /// `tick-event` carrying the new value.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotRunning`] before `start-command`, or
    /// [`SchedulerError::TickOverflow`] if the counter is exhausted.
    pub fn fire(&mut self) -> Result<Message, SchedulerError> {
        if self.state != SchedulerState::Running {
            return Err(SchedulerError::NotRunning { state: self.state });
        }
        self.tick = self
            .tick
            .checked_add(1)
            .ok_or(SchedulerError::TickOverflow)?;
        Ok(Message::TickEvent {
            tick: Some(self.tick),
        })
    }
}

/// Controller-side ends of the two channels joining the contexts.
#[derive(Debug)]
pub struct SchedulerLink {
    /// Envelopes addressed to the scheduler context.
    pub to_scheduler: mpsc::UnboundedSender<Envelope>,
    /// Envelopes emitted by the scheduler context, in send order.
    pub from_scheduler: mpsc::UnboundedReceiver<Envelope>,
}

/// Owner handle for a spawned scheduler task.
///
/// Dropping the handle detaches the task; it then runs until the controller
/// side of the channel goes away.
#[derive(Debug)]
pub struct SchedulerHandle {
    id: ContextId,
    cancel: watch::Sender<bool>,
    task: JoinHandle<SchedulerExit>,
}

impl SchedulerHandle {
    /// Return the identifier of the spawned context.
    pub const fn id(&self) -> ContextId {
        self.id
    }

    /// Stop the periodic task. The task drops its outbound sender, so the
    /// controller's receive loop ends once it has drained queued ticks.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Whether the task has already stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to stop and return why it did.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Task`] if the task panicked or was aborted.
    pub async fn join(self) -> Result<SchedulerExit, SchedulerError> {
        Ok(self.task.await?)
    }
}

/// Create a scheduler context on the current tokio runtime.
///
/// Returns the owner handle and the controller-side channel ends.
pub fn spawn_scheduler(
    config: &SchedulerConfig,
    handshake: bool,
) -> (SchedulerHandle, SchedulerLink) {
    let (to_scheduler, inbox) = mpsc::unbounded_channel();
    let (outbox, from_scheduler) = mpsc::unbounded_channel();
    let (cancel, cancel_rx) = watch::channel(false);

    let scheduler = Scheduler::new(handshake);
    let id = scheduler.id();
    let task = tokio::spawn(run_scheduler(
        scheduler,
        config.tick_interval(),
        inbox,
        outbox,
        cancel_rx,
    ));

    (
        SchedulerHandle { id, cancel, task },
        SchedulerLink {
            to_scheduler,
            from_scheduler,
        },
    )
}

/// Receive loop of a scheduler context.
///
/// Runs until cancelled, until the controller can no longer receive, or
/// until the inbox closes before the timer was ever started.
pub async fn run_scheduler(
    mut scheduler: Scheduler,
    period: Duration,
    mut inbox: mpsc::UnboundedReceiver<Envelope>,
    outbox: mpsc::UnboundedSender<Envelope>,
    mut cancel: watch::Receiver<bool>,
) -> SchedulerExit {
    let period = period.max(MIN_TICK_INTERVAL);
    let mut timer: Option<Interval> = None;
    let mut inbox_open = true;

    info!(
        context = %scheduler.id(),
        state = ?scheduler.state(),
        tick_interval_ms = period.as_millis(),
        "Scheduler context started"
    );

    let exit = loop {
        tokio::select! {
            biased;

            () = cancelled(&mut cancel) => break SchedulerExit::Cancelled,

            received = inbox.recv(), if inbox_open => {
                let Some(envelope) = received else {
                    inbox_open = false;
                    if timer.is_none() {
                        // Nobody is left to send start-command.
                        break SchedulerExit::ControllerGone;
                    }
                    continue;
                };

                match scheduler.handle(&envelope) {
                    SchedulerAction::Reply(reply) => {
                        debug!(context = %scheduler.id(), topic = %reply.topic(), "Replying");
                        if outbox.send(reply.to_envelope()).is_err() {
                            break SchedulerExit::ControllerGone;
                        }
                    }
                    SchedulerAction::StartTimer => {
                        info!(context = %scheduler.id(), "Starting ticker");
                        timer = Some(start_timer(period));
                    }
                    SchedulerAction::Ignore => {}
                }
            }

            () = next_fire(&mut timer) => {
                match scheduler.fire() {
                    Ok(event) => {
                        if outbox.send(event.to_envelope()).is_err() {
                            break SchedulerExit::ControllerGone;
                        }
                    }
                    Err(e) => {
                        error!(context = %scheduler.id(), error = %e, "Timer fire failed");
                        if let Some(exit) = fire_failure_exit(&e) {
                            break exit;
                        }
                    }
                }
            }
        }
    };

    info!(
        context = %scheduler.id(),
        exit = ?exit,
        last_tick = scheduler.tick(),
        "Scheduler context stopped"
    );
    exit
}

/// How a failed timer fire ends the task, if it does. Only an exhausted
/// counter is final; a fire outside `Running` is skipped.
const fn fire_failure_exit(error: &SchedulerError) -> Option<SchedulerExit> {
    match error {
        SchedulerError::TickOverflow => Some(SchedulerExit::CounterExhausted),
        SchedulerError::NotRunning { .. } | SchedulerError::Task { .. } => None,
    }
}

/// Repeating timer whose first fire is one full period from now.
fn start_timer(period: Duration) -> Interval {
    let start = Instant::now()
        .checked_add(period)
        .unwrap_or_else(Instant::now);
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Resolve on the next timer fire; never resolves before the timer exists.
async fn next_fire(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Resolve once cancellation is requested. A dropped handle can never
/// cancel, so that case never resolves.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let handle_dropped = cancel.wait_for(|requested| *requested).await.is_err();
    if handle_dropped {
        std::future::pending::<()>().await;
    }
}
