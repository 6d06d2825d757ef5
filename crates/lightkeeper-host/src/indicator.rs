//! Loading indicator that reports through the log.
//!
//! A graphical host would toggle a loading overlay here. The binary has no
//! screen, so visibility changes become log lines.

use lightkeeper_core::simulation::ControllerObserver;
use tracing::info;

/// Controller observer that tracks and logs loading-indicator visibility.
#[derive(Debug, Default)]
pub struct LogIndicator {
    visible: bool,
}

impl LogIndicator {
    /// Whether the indicator is currently shown.
    pub const fn is_visible(&self) -> bool {
        self.visible
    }
}

impl ControllerObserver for LogIndicator {
    fn loading(&mut self, description: &str) {
        self.visible = true;
        info!(description, "Loading");
    }

    fn ready(&mut self) {
        if self.visible {
            self.visible = false;
            info!("Loading complete");
        }
    }
}
