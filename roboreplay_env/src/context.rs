//! Core clock trait for RoboReplay playback.

use async_trait::async_trait;
use std::time::Duration;

/// The central interface for the playback cadence.
///
/// This trait abstracts the "render tick" so that the playback driver can run
/// against the wall clock (interactive replay) or against a virtual clock
/// (tests, headless batch replay).
///
/// # Implementations
///
/// - **Production**: `TokioClock` - wraps `tokio::time`
/// - **Virtual**: `VirtualClock` - sleep advances a manual clock instantly
///
/// # Determinism
///
/// The driver never reads time from anywhere else, so a `VirtualClock` run
/// renders exactly the same frame sequence as a wall-clock run.
#[async_trait]
pub trait ReplayClock: Send + Sync + 'static {
    /// Returns the time elapsed since the clock was created.
    ///
    /// For a virtual clock this is the accumulated virtual time.
    fn now(&self) -> Duration;

    /// Suspends playback until the next tick.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In virtual mode: advances the virtual clock and returns immediately
    async fn sleep(&self, duration: Duration);
}
