//! Controller session: scheduler creation and the foreground receive loop.
//!
//! [`initialize`] builds the [`Controller`], spawns its scheduler context,
//! and sends the first message. [`Session::run`] then processes envelopes
//! from the scheduler one at a time, in arrival order, until the scheduler
//! side of the channel closes. Each `advance` runs to completion before the
//! next envelope is read, so a slow simulation builds a backlog in the
//! unbounded channel rather than losing ticks.

use lightkeeper_types::{Message, SessionId, Topic};
use tracing::{info, warn};

use crate::config::LightkeeperConfig;
use crate::controller::{Controller, ControllerState};
use crate::scheduler::{self, SchedulerHandle, SchedulerLink};
use crate::simulation::{ControllerObserver, Simulation};

/// Errors that can occur while driving a session.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The scheduler context stopped listening before a command reached it.
    #[error("scheduler inbox closed before {topic} could be delivered")]
    ChannelClosed {
        /// Topic of the undeliverable message.
        topic: Topic,
    },
}

/// Why a session's receive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    /// The scheduler stopped after the controller became active.
    SchedulerStopped,
    /// The scheduler stopped before the handshake completed.
    HandshakeIncomplete,
}

/// Result of a session run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResult {
    /// The session that ran.
    pub session: SessionId,
    /// Why the loop ended.
    pub end_reason: SessionEndReason,
    /// Controller state when the loop ended.
    pub final_state: ControllerState,
    /// Number of `advance` calls made.
    pub ticks_applied: u64,
    /// Last tick value applied, if any.
    pub last_tick: Option<u64>,
}

/// A controller joined to its scheduler context.
#[derive(Debug)]
pub struct Session<S, O> {
    controller: Controller<S, O>,
    link: SchedulerLink,
    scheduler: Option<SchedulerHandle>,
}

/// Create the controller and its scheduler context and send the opening
/// message (`ready-query`, or `start-command` without the handshake).
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns [`RunnerError::ChannelClosed`] if the scheduler context is
/// already gone.
pub fn initialize<S, O>(
    simulation: S,
    observer: O,
    config: &LightkeeperConfig,
) -> Result<Session<S, O>, RunnerError>
where
    S: Simulation,
    O: ControllerObserver,
{
    let controller = Controller::new(simulation, observer, config.controller.clone());
    let (handle, link) =
        scheduler::spawn_scheduler(&config.scheduler, config.controller.handshake);

    info!(
        session = %controller.id(),
        context = %handle.id(),
        handshake = config.controller.handshake,
        tick_interval_ms = config.scheduler.tick_interval_ms,
        "Scheduler context created"
    );

    let mut session = Session::attach(controller, link);
    session.scheduler = Some(handle);
    session.begin()?;
    Ok(session)
}

impl<S, O> Session<S, O>
where
    S: Simulation,
    O: ControllerObserver,
{
    /// Join a controller to an existing pair of channel ends without a
    /// scheduler handle. The caller drives the other side.
    pub const fn attach(controller: Controller<S, O>, link: SchedulerLink) -> Self {
        Self {
            controller,
            link,
            scheduler: None,
        }
    }

    /// Send the controller's opening message, if it has not begun yet.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::ChannelClosed`] if the scheduler inbox is closed.
    pub fn begin(&mut self) -> Result<(), RunnerError> {
        match self.controller.begin() {
            Some(message) => self.send(message),
            None => Ok(()),
        }
    }

    /// Process scheduler envelopes until the scheduler side closes.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::ChannelClosed`] if a reply cannot be delivered.
    pub async fn run(&mut self) -> Result<SessionResult, RunnerError> {
        while let Some(envelope) = self.link.from_scheduler.recv().await {
            if let Some(reply) = self.controller.handle(&envelope) {
                self.send(reply)?;
            }
        }

        let final_state = self.controller.state();
        let end_reason = if final_state == ControllerState::Active {
            SessionEndReason::SchedulerStopped
        } else {
            SessionEndReason::HandshakeIncomplete
        };

        Ok(SessionResult {
            session: self.controller.id(),
            end_reason,
            final_state,
            ticks_applied: self.controller.ticks_applied(),
            last_tick: self.controller.last_tick(),
        })
    }

    fn send(&self, message: Message) -> Result<(), RunnerError> {
        self.link
            .to_scheduler
            .send(message.to_envelope())
            .map_err(|_closed| RunnerError::ChannelClosed {
                topic: message.topic(),
            })
    }

    /// Borrow the controller.
    pub const fn controller(&self) -> &Controller<S, O> {
        &self.controller
    }

    /// Borrow the scheduler handle, if this session owns one.
    pub const fn scheduler(&self) -> Option<&SchedulerHandle> {
        self.scheduler.as_ref()
    }

    /// Take ownership of the scheduler handle, e.g. to cancel it from
    /// another task while [`run`](Self::run) is in progress.
    pub const fn take_scheduler(&mut self) -> Option<SchedulerHandle> {
        self.scheduler.take()
    }

    /// Consume the session, returning the controller.
    pub fn into_controller(self) -> Controller<S, O> {
        self.controller
    }
}

/// Log the end of a session.
pub fn log_session_end(result: &SessionResult) {
    info!(
        session = %result.session,
        reason = ?result.end_reason,
        ticks_applied = result.ticks_applied,
        last_tick = ?result.last_tick,
        "Session ended"
    );

    if result.end_reason == SessionEndReason::HandshakeIncomplete {
        warn!(
            session = %result.session,
            final_state = ?result.final_state,
            "Scheduler stopped before the handshake completed"
        );
    }
}
