//! Foreground controller: startup handshake and per-tick dispatch.
//!
//! [`Controller`] is a synchronous state machine. It owns the simulation
//! object and the observer, turns inbound envelopes into at most one
//! outbound [`Message`], and advances the simulation exactly once for every
//! `tick-event` it handles while [`ControllerState::Active`]. The receive
//! loop that feeds it lives in [`crate::runner`].
//!
//! ```text
//! handshake:      Initializing --(ready-query sent)--> WaitingForWorkerReady --(ready-ack)--> Active
//! handshake-less: Initializing --(start-command sent)--> Active
//! ```

use chrono::Utc;
use lightkeeper_types::{Direction, Envelope, Message, SessionId};
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::simulation::{ControllerObserver, Simulation};

/// Lifecycle of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    /// Constructed; nothing sent yet.
    Initializing,
    /// `ready-query` sent, waiting for `ready-ack`.
    WaitingForWorkerReady,
    /// `start-command` sent; ticks are applied. Terminal.
    Active,
}

/// Controller state machine.
#[derive(Debug)]
pub struct Controller<S, O> {
    /// Identifier used to correlate log lines.
    id: SessionId,
    /// Current lifecycle state.
    state: ControllerState,
    /// The simulation advanced once per tick.
    simulation: S,
    /// Loading indicator and tick observer.
    observer: O,
    /// Static controller settings.
    config: ControllerConfig,
    /// Number of `advance` calls made.
    ticks_applied: u64,
    /// Last tick value carried by an applied `tick-event`.
    last_tick: Option<u64>,
}

impl<S: Simulation, O: ControllerObserver> Controller<S, O> {
    /// Create a controller in [`ControllerState::Initializing`].
    pub fn new(simulation: S, observer: O, config: ControllerConfig) -> Self {
        Self {
            id: SessionId::new(),
            state: ControllerState::Initializing,
            simulation,
            observer,
            config,
            ticks_applied: 0,
            last_tick: None,
        }
    }

    /// Leave `Initializing`: load the simulation's content, show the loading
    /// indicator, and return the first message for the scheduler context.
    ///
    /// Returns `None` if the controller has already begun.
    pub fn begin(&mut self) -> Option<Message> {
        if self.state != ControllerState::Initializing {
            return None;
        }

        self.simulation.load_content();
        self.observer.loading(&self.config.loading_description);

        if self.config.handshake {
            self.state = ControllerState::WaitingForWorkerReady;
            info!(session = %self.id, "Waiting for scheduler readiness");
            Some(Message::ReadyQuery)
        } else {
            self.state = ControllerState::Active;
            self.observer.ready();
            info!(session = %self.id, "Starting ticker without handshake");
            Some(Message::StartCommand)
        }
    }

    /// React to one envelope from the scheduler context.
    ///
    /// Returns the message to send back, if any. Malformed envelopes, unknown
    /// topics, and messages that do not fit the current state are discarded.
    pub fn handle(&mut self, envelope: &Envelope) -> Option<Message> {
        let message = Message::from_envelope(envelope)?;
        if message.topic().direction() != Direction::ToController {
            return None;
        }

        match (self.state, message) {
            (ControllerState::WaitingForWorkerReady, Message::ReadyAck) => {
                self.state = ControllerState::Active;
                self.observer.ready();
                info!(session = %self.id, "Scheduler ready, starting ticker");
                Some(Message::StartCommand)
            }
            (ControllerState::Active, Message::TickEvent { tick }) => {
                self.apply_tick(tick);
                None
            }
            _ => None,
        }
    }

    /// Advance the simulation for one tick.
    fn apply_tick(&mut self, tick: Option<u64>) {
        if let (Some(previous), Some(current)) = (self.last_tick, tick) {
            if previous.checked_add(1) != Some(current) {
                warn!(
                    session = %self.id,
                    previous,
                    current,
                    "Tick sequence is not contiguous"
                );
            }
        }

        self.simulation.advance();
        self.ticks_applied = self.ticks_applied.saturating_add(1);
        if tick.is_some() {
            self.last_tick = tick;
        }

        if self.config.log_ticks {
            debug!(session = %self.id, tick = ?tick, at = %Utc::now(), "Tick");
        }

        self.observer.on_tick(tick);
    }

    /// Return the session identifier.
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Return the current lifecycle state.
    pub const fn state(&self) -> ControllerState {
        self.state
    }

    /// Return how many times the simulation has been advanced.
    pub const fn ticks_applied(&self) -> u64 {
        self.ticks_applied
    }

    /// Return the last tick value applied, if any tick carried one.
    pub const fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    /// Borrow the simulation.
    pub const fn simulation(&self) -> &S {
        &self.simulation
    }

    /// Borrow the observer.
    pub const fn observer(&self) -> &O {
        &self.observer
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Default)]
    struct CountingSimulation {
        loads: u32,
        advances: u64,
        advanced_before_load: bool,
    }

    impl Simulation for CountingSimulation {
        fn advance(&mut self) {
            if self.loads == 0 {
                self.advanced_before_load = true;
            }
            self.advances = self.advances.saturating_add(1);
        }

        fn load_content(&mut self) {
            self.loads = self.loads.saturating_add(1);
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Seen {
        Loading(String),
        Ready,
        Tick(Option<u64>),
    }

    #[derive(Debug, Default)]
    struct RecordingObserver {
        seen: Vec<Seen>,
    }

    impl ControllerObserver for RecordingObserver {
        fn loading(&mut self, description: &str) {
            self.seen.push(Seen::Loading(description.to_owned()));
        }

        fn ready(&mut self) {
            self.seen.push(Seen::Ready);
        }

        fn on_tick(&mut self, tick: Option<u64>) {
            self.seen.push(Seen::Tick(tick));
        }
    }

    fn make_controller(handshake: bool) -> Controller<CountingSimulation, RecordingObserver> {
        let config = ControllerConfig {
            handshake,
            log_ticks: true,
            loading_description: String::from("Loading test"),
        };
        Controller::new(
            CountingSimulation::default(),
            RecordingObserver::default(),
            config,
        )
    }

    fn tick(value: u64) -> Envelope {
        Message::TickEvent { tick: Some(value) }.to_envelope()
    }

    #[test]
    fn begin_sends_ready_query_with_handshake() {
        let mut controller = make_controller(true);
        assert_eq!(controller.state(), ControllerState::Initializing);

        assert_eq!(controller.begin(), Some(Message::ReadyQuery));
        assert_eq!(controller.state(), ControllerState::WaitingForWorkerReady);
        assert_eq!(controller.simulation().loads, 1);
        assert_eq!(
            controller.observer().seen,
            vec![Seen::Loading(String::from("Loading test"))]
        );
    }

    #[test]
    fn begin_sends_start_without_handshake() {
        let mut controller = make_controller(false);
        assert_eq!(controller.begin(), Some(Message::StartCommand));
        assert_eq!(controller.state(), ControllerState::Active);
        assert_eq!(
            controller.observer().seen,
            vec![Seen::Loading(String::from("Loading test")), Seen::Ready]
        );
    }

    #[test]
    fn begin_happens_once() {
        let mut controller = make_controller(true);
        let _ = controller.begin();
        assert_eq!(controller.begin(), None);
        assert_eq!(controller.simulation().loads, 1);
    }

    #[test]
    fn ready_ack_activates_and_commands_start() {
        let mut controller = make_controller(true);
        let _ = controller.begin();

        let reply = controller.handle(&Message::ReadyAck.to_envelope());
        assert_eq!(reply, Some(Message::StartCommand));
        assert_eq!(controller.state(), ControllerState::Active);
        assert_eq!(controller.observer().seen.last(), Some(&Seen::Ready));

        // A second acknowledgement does not re-send start.
        assert_eq!(controller.handle(&Message::ReadyAck.to_envelope()), None);
    }

    #[test]
    fn ticks_advance_once_each_in_order() {
        let mut controller = make_controller(false);
        let _ = controller.begin();

        for value in 1..=3 {
            assert_eq!(controller.handle(&tick(value)), None);
        }

        assert_eq!(controller.simulation().advances, 3);
        assert!(!controller.simulation().advanced_before_load);
        assert_eq!(controller.ticks_applied(), 3);
        assert_eq!(controller.last_tick(), Some(3));
        let ticks: Vec<&Seen> = controller
            .observer()
            .seen
            .iter()
            .filter(|s| matches!(s, Seen::Tick(_)))
            .collect();
        assert_eq!(
            ticks,
            vec![
                &Seen::Tick(Some(1)),
                &Seen::Tick(Some(2)),
                &Seen::Tick(Some(3))
            ]
        );
    }

    #[test]
    fn null_tick_payload_still_advances() {
        let mut controller = make_controller(false);
        let _ = controller.begin();

        let _ = controller.handle(&Message::TickEvent { tick: None }.to_envelope());
        assert_eq!(controller.simulation().advances, 1);
        assert_eq!(controller.last_tick(), None);
    }

    #[test]
    fn ticks_before_activation_are_discarded() {
        let mut controller = make_controller(true);
        let _ = controller.handle(&tick(1));
        let _ = controller.begin();
        let _ = controller.handle(&tick(1));

        assert_eq!(controller.simulation().advances, 0);
        assert_eq!(controller.state(), ControllerState::WaitingForWorkerReady);
    }

    #[test]
    fn malformed_and_foreign_envelopes_are_discarded() {
        let mut controller = make_controller(true);
        let _ = controller.begin();
        let seen_before = controller.observer().seen.clone();

        let inputs = [
            Envelope::default(),
            Envelope::new("bogus", None),
            Message::ReadyQuery.to_envelope(),
            Message::StartCommand.to_envelope(),
        ];
        for envelope in &inputs {
            assert_eq!(controller.handle(envelope), None);
        }

        assert_eq!(controller.state(), ControllerState::WaitingForWorkerReady);
        assert_eq!(controller.observer().seen, seen_before);
        assert_eq!(controller.simulation().advances, 0);
    }

    #[test]
    fn gaps_are_still_applied() {
        let mut controller = make_controller(false);
        let _ = controller.begin();
        let _ = controller.handle(&tick(1));
        let _ = controller.handle(&tick(5));

        assert_eq!(controller.ticks_applied(), 2);
        assert_eq!(controller.last_tick(), Some(5));
    }

    #[test]
    fn scheduler_bound_topics_are_rejected_once_active() {
        let mut controller = make_controller(false);
        let _ = controller.begin();
        let seen_before = controller.observer().seen.clone();

        assert_eq!(controller.handle(&Message::ReadyQuery.to_envelope()), None);
        assert_eq!(controller.handle(&Message::StartCommand.to_envelope()), None);

        assert_eq!(controller.state(), ControllerState::Active);
        assert_eq!(controller.observer().seen, seen_before);
        assert_eq!(controller.ticks_applied(), 0);
    }

    /// Log sink shared between the subscriber and the test body.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run two ticks through an active controller and return the log output.
    fn logs_for_two_ticks(log_ticks: bool) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let config = ControllerConfig {
                handshake: false,
                log_ticks,
                ..ControllerConfig::default()
            };
            let mut controller = Controller::new(
                CountingSimulation::default(),
                RecordingObserver::default(),
                config,
            );
            let _ = controller.begin();
            let _ = controller.handle(&tick(1));
            let _ = controller.handle(&tick(2));
        });

        logs.contents()
    }

    #[test]
    fn tick_logging_follows_config() {
        let enabled = logs_for_two_ticks(true);
        assert!(enabled.contains("tick=Some(1)"));
        assert!(enabled.contains("tick=Some(2)"));

        let disabled = logs_for_two_ticks(false);
        assert!(disabled.contains("Starting ticker without handshake"));
        assert!(!disabled.contains("tick=Some("));
    }
}
