//! Demo simulation driven by the host.
//!
//! The host only needs something that loads content once and counts steps;
//! real game rules plug in through the same [`Simulation`] trait.

use lightkeeper_core::simulation::Simulation;
use tracing::{debug, trace};

/// Content bundled with the binary, as `(kind, name)` pairs.
const BUNDLED_CONTENT: &[(&str, &str)] = &[("building", "stockpile"), ("resource", "light")];

/// A simulation that records its loaded content and step count.
#[derive(Debug, Default)]
pub struct Beacon {
    content: Vec<(&'static str, &'static str)>,
    steps: u64,
}

impl Beacon {
    /// Create an empty beacon.
    pub const fn new() -> Self {
        Self {
            content: Vec::new(),
            steps: 0,
        }
    }

    /// Number of steps advanced.
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Number of loaded content entries.
    pub fn content_len(&self) -> usize {
        self.content.len()
    }
}

impl Simulation for Beacon {
    fn advance(&mut self) {
        self.steps = self.steps.saturating_add(1);
        trace!(steps = self.steps, "Beacon advanced");
    }

    fn load_content(&mut self) {
        for &(kind, name) in BUNDLED_CONTENT {
            self.content.push((kind, name));
            debug!(kind, name, "Content loaded");
        }
    }
}
