//! Production `FusionContext` backed by the monotonic system clock.

use crate::FusionContext;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct WallClock {
    start: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    /// Arc-wrapped clock, the form `FusionService` takes.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FusionContext for WallClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}
