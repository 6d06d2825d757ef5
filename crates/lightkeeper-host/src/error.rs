//! Error types for the host binary.
//!
//! [`HostError`] is the top-level error type that wraps all possible
//! failure modes during startup and the session run.

/// Top-level error for the host binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: lightkeeper_core::config::ConfigError,
    },

    /// The controller session failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: lightkeeper_core::runner::RunnerError,
    },

    /// The scheduler task failed.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: lightkeeper_core::scheduler::SchedulerError,
    },

    /// Installing the interrupt handler failed.
    #[error("signal error: {source}")]
    Signal {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
