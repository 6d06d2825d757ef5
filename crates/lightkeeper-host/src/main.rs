//! Host binary for Lightkeeper.
//!
//! Wires the controller to a demo simulation and a log-backed loading
//! indicator, spawns the tick scheduler, and runs the session until the
//! scheduler stops or the process is interrupted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `lightkeeper.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Create the controller and its scheduler context
//! 4. Run the receive loop until the scheduler stops or Ctrl-C arrives
//! 5. On interrupt, cancel the scheduler and drain the remaining ticks
//! 6. Log the result

mod beacon;
mod error;
mod indicator;

use std::path::Path;

use lightkeeper_core::config::LightkeeperConfig;
use lightkeeper_core::runner;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::beacon::Beacon;
use crate::error::HostError;
use crate::indicator::LogIndicator;

/// Default location of the configuration file, relative to the working
/// directory.
const CONFIG_PATH: &str = "lightkeeper.yaml";

/// Application entry point for the host.
///
/// # Errors
///
/// Returns an error if configuration loading, the session, or the
/// scheduler task fails.
#[tokio::main]
async fn main() -> Result<(), HostError> {
    // 1. Load configuration. Logging depends on it, so it comes first.
    let config_path = Path::new(CONFIG_PATH);
    let config_found = config_path.exists();
    let config = if config_found {
        LightkeeperConfig::from_file(config_path)?
    } else {
        LightkeeperConfig::parse("")?
    };

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("lightkeeper-host starting");
    if !config_found {
        info!(path = CONFIG_PATH, "Config file not found, using defaults");
    }
    info!(
        tick_interval_ms = config.scheduler.tick_interval_ms,
        handshake = config.controller.handshake,
        log_ticks = config.controller.log_ticks,
        "Configuration loaded"
    );

    // 3. Create the controller and scheduler.
    let mut session = runner::initialize(Beacon::new(), LogIndicator::default(), &config)?;
    let scheduler = session.take_scheduler();

    // 4. Run until the scheduler stops or the operator interrupts.
    let outcome = tokio::select! {
        result = session.run() => Some(result?),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            None
        }
    };

    let result = match outcome {
        Some(result) => {
            if let Some(scheduler) = scheduler {
                let exit = scheduler.join().await?;
                info!(?exit, "Scheduler finished");
            }
            result
        }
        None => {
            // 5. Stop the ticker, then apply whatever it already sent.
            info!("Interrupt received, stopping scheduler");
            if let Some(scheduler) = scheduler {
                scheduler.cancel();
                let exit = scheduler.join().await?;
                info!(?exit, "Scheduler finished");
            }
            session.run().await?
        }
    };

    // 6. Log results.
    runner::log_session_end(&result);

    let controller = session.into_controller();
    info!(
        steps = controller.simulation().steps(),
        content_entries = controller.simulation().content_len(),
        indicator_visible = controller.observer().is_visible(),
        "lightkeeper-host shutdown complete"
    );

    Ok(())
}
