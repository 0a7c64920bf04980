//! Virtual clock implementing ReplayClock for deterministic playback.

use crate::ReplayClock;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Clock whose time only moves when playback sleeps or the owner advances it.
///
/// Clones share the same underlying time, so a test can hold one handle while
/// the driver sleeps on another.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    /// Current virtual time (nanoseconds since creation)
    virtual_time_ns: Arc<AtomicU64>,

    /// Number of sleeps observed (one per rendered tick)
    sleeps: Arc<AtomicU64>,
}

impl VirtualClock {
    /// Creates a new VirtualClock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        self.virtual_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        self.virtual_time_ns.load(Ordering::SeqCst)
    }

    /// Returns how many times `sleep` has been awaited.
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplayClock for VirtualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance_time(duration);
    }
}
