//! Tick scheduling and controller handshake for Lightkeeper.
//!
//! A background scheduler context emits a steady cadence of numbered ticks;
//! a foreground controller performs a readiness handshake with it and then
//! advances its simulation exactly once per tick, in arrival order. The two
//! sides share no memory: one unbounded ordered channel runs in each
//! direction.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `lightkeeper.yaml` into
//!   strongly-typed structs.
//! - [`controller`] -- Controller state machine.
//! - [`runner`] -- [`initialize`](runner::initialize) and the session receive
//!   loop.
//! - [`scheduler`] -- Scheduler state machine, tick counter, and periodic task.
//! - [`simulation`] -- [`Simulation`] and [`ControllerObserver`] collaborator
//!   traits.
//!
//! [`Simulation`]: simulation::Simulation
//! [`ControllerObserver`]: simulation::ControllerObserver

pub mod config;
pub mod controller;
pub mod runner;
pub mod scheduler;
pub mod simulation;
