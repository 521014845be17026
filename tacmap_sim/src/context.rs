//! Simulation context implementing FusionContext for deterministic runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tacmap_env::FusionContext;

/// Simulation context backed by a virtual clock.
///
/// This implements `FusionContext` using:
/// - A virtual clock that only moves when the runner advances it
/// - A master seed from which every random stream is derived
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<AtomicU64>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        self.virtual_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Moves virtual time forward to `time_ns`. Never goes backwards.
    pub fn advance_to(&self, time_ns: u64) {
        self.virtual_time_ns.fetch_max(time_ns, Ordering::SeqCst);
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        self.virtual_time_ns.load(Ordering::SeqCst)
    }

    /// Derives an independent seed for one random stream.
    ///
    /// Flight physics and delivery chaos use different streams so that
    /// changing the delivery profile does not move the aircraft.
    pub fn stream_seed(&self, stream: u64) -> u64 {
        self.seed.wrapping_mul(0x517cc1b727220a95) ^ stream.wrapping_mul(0x9e3779b97f4a7c15)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
        }
    }
}

impl FusionContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now_ms(), 1500);
    }

    #[test]
    fn test_sim_context_advance_to_is_monotonic() {
        let ctx = SimContext::new(42);
        ctx.advance_to(2_000_000_000);
        ctx.advance_to(1_000_000_000);
        assert_eq!(ctx.now(), Duration::from_secs(2));
    }

    #[test]
    fn test_sim_context_stream_seeds() {
        let ctx1 = SimContext::new(42);
        let ctx2 = SimContext::new(42);

        // Same seed + stream = same derived seed
        assert_eq!(ctx1.stream_seed(1), ctx2.stream_seed(1));

        // Different stream = different seed
        assert_ne!(ctx1.stream_seed(1), ctx1.stream_seed(2));
        assert_ne!(ctx1.stream_seed(1), SimContext::new(43).stream_seed(1));
    }

    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));

        // Both should see the same time
        assert_eq!(ctx1.now(), ctx2.now());
    }
}
