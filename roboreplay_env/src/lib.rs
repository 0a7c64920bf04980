//! RoboReplay Environment Abstraction Layer
//!
//! This crate provides the clock abstraction that lets the playback driver
//! run against **Wall-clock** time (tokio) or a **Virtual** clock.
//!
//! # Core Concept: Pull-Based Ticks
//!
//! The playback driver never registers callbacks with a GUI event loop.
//! Instead the host awaits `ReplayClock::sleep` between frames and asks the
//! driver to advance exactly one frame. Stop requests are observed only at
//! those tick boundaries.
//!
//! # Example
//!
//! ```ignore
//! use roboreplay_env::{ReplayClock, StopSignal};
//!
//! async fn host_loop<C: ReplayClock>(clock: &C, stop: &StopSignal) {
//!     while !stop.is_requested() {
//!         advance_one_frame();
//!         clock.sleep(Duration::from_millis(100)).await;
//!     }
//! }
//! ```

mod context;
mod stop;
mod tokio_impl;
mod virtual_clock;

pub use context::ReplayClock;
pub use stop::StopSignal;
pub use tokio_impl::TokioClock;
pub use virtual_clock::VirtualClock;
