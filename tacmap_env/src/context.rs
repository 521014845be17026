//! Clock abstraction for TacMap fusion services.

use std::time::Duration;

/// The clock the fusion service reads.
///
/// Production uses the monotonic system clock; the scenario harness uses a
/// virtual clock it advances explicitly, so arrival lag logged by the
/// service is reproducible.
///
/// # Implementations
///
/// - **Production**: `WallClock` - `std::time::Instant` since creation
/// - **Simulation**: `SimContext` - manually advanced virtual clock
pub trait FusionContext: Send + Sync + 'static {
    /// Time elapsed since the context was created.
    fn now(&self) -> Duration;

    /// Milliseconds since context creation, the unit used by envelopes.
    fn now_ms(&self) -> u64 {
        self.now().as_millis() as u64
    }
}
