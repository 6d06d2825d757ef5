//! Collaborators the controller drives but does not own the logic of.
//!
//! The [`Simulation`] is opaque: the controller only ever asks it to load its
//! initial content once and then to advance one step per tick. The
//! [`ControllerObserver`] is notified at handshake boundaries (the loading
//! indicator) and after every applied tick.

/// A simulation object advanced once per tick.
///
/// Both operations are synchronous and infallible from the controller's
/// point of view. An `advance` that outlasts the tick period makes later
/// ticks queue; none are dropped.
pub trait Simulation {
    /// Advance the simulation by exactly one step.
    fn advance(&mut self);

    /// Bulk-load initial content. Called once, before the controller sends
    /// its first message to the scheduler context.
    fn load_content(&mut self) {}
}

/// Observer of controller progress.
pub trait ControllerObserver {
    /// The controller is initializing; show a loading indicator with the
    /// given description.
    fn loading(&mut self, description: &str);

    /// The scheduler context is ready; hide the loading indicator.
    fn ready(&mut self);

    /// Called after the simulation advanced for the given tick.
    fn on_tick(&mut self, _tick: Option<u64>) {}
}

/// An observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl ControllerObserver for NoOpObserver {
    fn loading(&mut self, _description: &str) {}

    fn ready(&mut self) {}
}
