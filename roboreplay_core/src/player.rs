//! Playback driver.
//!
//! Pulls one World Snapshot per tick, evaluates the nearest obstacle and
//! forwards the frame to a [`RenderSink`].
//!
//! ```text
//!            advance()            advance() (snapshot)
//!   ┌──────┐ ────────► ┌─────────┐ ◄──────┐
//!   │ Idle │           │ Running │ ───────┘
//!   └──────┘           └─────────┘
//!       │                   │ end of log / stop / fatal error
//!       │ stop()            ▼
//!       └──────────► ┌──────────────────┐
//!                    │ Finished(reason) │
//!                    └──────────────────┘
//! ```
//!
//! The snapshot source is dropped as soon as the driver reaches `Finished`.

use crate::merger::{MergeStats, StreamMerger, RecordFault};
use crate::nearest;
use crate::render::{FinishReason, FrameCommand, RenderSink, SinkError};
use crate::source::LogError;
use crate::types::{timestamp_secs, Extents, ObjectId, ObjectSet, Pose, Timestamp, WorldSnapshot};
use roboreplay_env::{ReplayClock, StopSignal};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fatal playback errors.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Render sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("Snapshot source failed: {0}")]
    Source(#[from] LogError),
}

/// Driver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Running,
    Finished(FinishReason),
}

impl PlaybackState {
    pub fn is_finished(&self) -> bool {
        matches!(self, PlaybackState::Finished(_))
    }
}

/// An ordered sequence of World Snapshots the driver can play.
pub trait SnapshotSource: Iterator<Item = Result<WorldSnapshot, LogError>> {
    /// Merge counters, if the source keeps any.
    fn merge_stats(&self) -> MergeStats {
        MergeStats::default()
    }
}

impl<P, O> SnapshotSource for StreamMerger<P, O>
where
    P: Iterator<Item = Result<Pose, RecordFault>>,
    O: Iterator<Item = Result<ObjectSet, RecordFault>>,
{
    fn merge_stats(&self) -> MergeStats {
        self.stats()
    }
}

impl SnapshotSource for std::vec::IntoIter<Result<WorldSnapshot, LogError>> {}

/// Smallest nearest-obstacle distance seen during playback.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosestApproach {
    pub distance: f64,
    pub timestamp: Timestamp,
    pub object_id: ObjectId,
}

/// Outcome of a finished playback.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSummary {
    pub frames_rendered: u64,
    pub reason: FinishReason,
    pub closest_approach: Option<ClosestApproach>,
    pub merge_stats: MergeStats,
}

/// Frame-by-frame player over a snapshot source.
pub struct PlaybackDriver<S, K> {
    source: Option<S>,
    sink: K,
    state: PlaybackState,
    tick_interval: Duration,
    robot_extents: Option<Extents>,
    frames_rendered: u64,
    closest: Option<ClosestApproach>,
    merge_stats: MergeStats,
}

impl<S, K> PlaybackDriver<S, K>
where
    S: SnapshotSource,
    K: RenderSink,
{
    pub fn new(source: S, sink: K, tick_interval: Duration) -> Self {
        Self {
            source: Some(source),
            sink,
            state: PlaybackState::Idle,
            tick_interval,
            robot_extents: None,
            frames_rendered: 0,
            closest: None,
            merge_stats: MergeStats::default(),
        }
    }

    /// Robot footprint passed to the sink with every frame.
    pub fn with_robot_extents(mut self, extents: Option<Extents>) -> Self {
        self.robot_extents = extents;
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Consumes the driver and returns its sink.
    pub fn into_sink(self) -> K {
        self.sink
    }

    /// True while the driver still holds its snapshot source.
    pub fn holds_source(&self) -> bool {
        self.source.is_some()
    }

    /// Advances exactly one frame.
    ///
    /// Returns `Running` after a frame was drawn, `Finished(_)` once the log
    /// is exhausted. Calling it after `Finished` is a no-op. Errors are fatal:
    /// the driver is `Finished(Failed)` when one is returned.
    pub fn advance(&mut self) -> Result<PlaybackState, PlaybackError> {
        match self.state {
            PlaybackState::Finished(_) => return Ok(self.state),
            PlaybackState::Idle => {
                if let Err(e) = self.sink.begin(self.robot_extents) {
                    self.finish(FinishReason::Failed)?;
                    return Err(e.into());
                }
                self.state = PlaybackState::Running;
                debug!("Playback started");
            }
            PlaybackState::Running => {}
        }

        let next = match self.source.as_mut() {
            Some(source) => source.next(),
            None => None,
        };

        let snapshot = match next {
            None => {
                self.finish(FinishReason::EndOfLog)?;
                return Ok(self.state);
            }
            Some(Err(e)) => {
                self.finish(FinishReason::Failed)?;
                return Err(e.into());
            }
            Some(Ok(snapshot)) => snapshot,
        };

        let result = nearest::evaluate(&snapshot);
        let frame = FrameCommand {
            frame_index: self.frames_rendered,
            timestamp: snapshot.timestamp,
            robot: &snapshot.pose,
            obstacles: &snapshot.objects,
            nearest: &result,
            robot_extents: self.robot_extents,
        };

        if let Err(e) = self.sink.draw(&frame) {
            self.finish(FinishReason::Failed)?;
            return Err(e.into());
        }
        self.frames_rendered += 1;

        if let (Some(id), Some(d)) = (&result.object_id, result.distance) {
            if self.closest.as_ref().map_or(true, |c| d < c.distance) {
                self.closest = Some(ClosestApproach {
                    distance: d,
                    timestamp: snapshot.timestamp,
                    object_id: id.clone(),
                });
            }
        }

        Ok(self.state)
    }

    /// Ends playback on request. No-op once finished.
    pub fn stop(&mut self) -> Result<PlaybackState, PlaybackError> {
        if !self.state.is_finished() {
            self.finish(FinishReason::Stopped)?;
        }
        Ok(self.state)
    }

    /// Plays until the log ends, `stop` is requested, or a fatal error.
    ///
    /// The stop signal is checked once per tick, before the next frame is
    /// pulled; the clock sleeps for the tick interval after every frame.
    pub async fn run<C>(&mut self, clock: &C, stop: &StopSignal) -> Result<PlaybackSummary, PlaybackError>
    where
        C: ReplayClock + ?Sized,
    {
        info!(
            "Playing back at {:.0} ms per frame",
            self.tick_interval.as_secs_f64() * 1000.0
        );

        loop {
            if stop.is_requested() {
                info!("Stop requested after {} frames", self.frames_rendered);
                self.stop()?;
                break;
            }

            if self.advance()?.is_finished() {
                break;
            }

            clock.sleep(self.tick_interval).await;
        }

        self.summary().ok_or(PlaybackError::Sink(SinkError::Closed))
    }

    /// Summary of a finished playback; `None` while still playing.
    pub fn summary(&self) -> Option<PlaybackSummary> {
        let PlaybackState::Finished(reason) = self.state else {
            return None;
        };
        Some(PlaybackSummary {
            frames_rendered: self.frames_rendered,
            reason,
            closest_approach: self.closest.clone(),
            merge_stats: self.merge_stats,
        })
    }

    fn finish(&mut self, reason: FinishReason) -> Result<(), SinkError> {
        if let Some(source) = self.source.take() {
            self.merge_stats = source.merge_stats();
        }
        self.state = PlaybackState::Finished(reason);

        match &self.closest {
            Some(c) => info!(
                "Playback finished ({:?}): {} frames, closest approach {:.2} m to {} at t={:.3}s",
                reason,
                self.frames_rendered,
                c.distance,
                c.object_id,
                timestamp_secs(c.timestamp)
            ),
            None => info!(
                "Playback finished ({:?}): {} frames",
                reason, self.frames_rendered
            ),
        }

        match self.sink.finish(reason) {
            Err(e) if reason == FinishReason::Failed => {
                warn!("Render sink failed while closing: {}", e);
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MemorySink;
    use crate::types::TrackedObject;
    use roboreplay_env::VirtualClock;

    fn snap(t: Timestamp, robot_x: f64, objects: Vec<TrackedObject>) -> Result<WorldSnapshot, LogError> {
        Ok(WorldSnapshot {
            timestamp: t,
            pose: Pose::new(t, robot_x, 0.0, 0.0),
            objects,
        })
    }

    fn source(items: Vec<Result<WorldSnapshot, LogError>>) -> std::vec::IntoIter<Result<WorldSnapshot, LogError>> {
        items.into_iter()
    }

    fn truncated() -> LogError {
        LogError::Io {
            path: "recording.mcap".into(),
            source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated"),
        }
    }

    /// Requests a stop while drawing one frame.
    struct StoppingSink {
        inner: MemorySink,
        stop: StopSignal,
        stop_at: u64,
    }

    impl RenderSink for StoppingSink {
        fn draw(&mut self, frame: &FrameCommand<'_>) -> Result<(), SinkError> {
            if frame.frame_index == self.stop_at {
                self.stop.request_stop();
            }
            self.inner.draw(frame)
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut driver = PlaybackDriver::new(
            source(vec![snap(0, 0.0, vec![]), snap(1, 1.0, vec![])]),
            MemorySink::new(),
            Duration::from_millis(100),
        );
        assert_eq!(driver.state(), PlaybackState::Idle);

        assert_eq!(driver.advance().unwrap(), PlaybackState::Running);
        assert_eq!(driver.advance().unwrap(), PlaybackState::Running);
        assert!(driver.holds_source());

        assert_eq!(
            driver.advance().unwrap(),
            PlaybackState::Finished(FinishReason::EndOfLog)
        );
        assert!(!driver.holds_source());

        // Finished is terminal
        assert_eq!(
            driver.advance().unwrap(),
            PlaybackState::Finished(FinishReason::EndOfLog)
        );
        assert_eq!(driver.frames_rendered(), 2);
        assert_eq!(driver.sink().finished, Some(FinishReason::EndOfLog));
    }

    #[test]
    fn test_frames_carry_nearest_result() {
        let mut driver = PlaybackDriver::new(
            source(vec![
                snap(0, 0.0, vec![]),
                snap(5, 0.0, vec![TrackedObject::new("a", 3.0, 0.0), TrackedObject::new("b", 0.0, 1.0)]),
            ]),
            MemorySink::new(),
            Duration::from_millis(10),
        )
        .with_robot_extents(Some(Extents::new(0.6, 0.4)));

        while !driver.advance().unwrap().is_finished() {}

        let sink = driver.into_sink();
        assert_eq!(sink.robot_extents, Some(Extents::new(0.6, 0.4)));
        assert_eq!(sink.frames.len(), 2);
        assert!(sink.frames[0].nearest.is_none());
        assert_eq!(sink.frames[1].nearest.index, Some(1));
        assert_eq!(sink.frames[1].nearest.distance, Some(1.0));
        assert_eq!(sink.frames[1].frame_index, 1);
    }

    #[test]
    fn test_sink_failure_is_fatal() {
        let mut driver = PlaybackDriver::new(
            source(vec![snap(0, 0.0, vec![]), snap(1, 0.0, vec![]), snap(2, 0.0, vec![])]),
            MemorySink::failing_at(1),
            Duration::from_millis(10),
        );

        assert!(driver.advance().is_ok());
        let err = driver.advance().unwrap_err();
        assert!(matches!(err, PlaybackError::Sink(_)));
        assert_eq!(driver.state(), PlaybackState::Finished(FinishReason::Failed));
        assert!(!driver.holds_source());

        // No retry once failed
        assert_eq!(driver.advance().unwrap(), PlaybackState::Finished(FinishReason::Failed));
        assert_eq!(driver.sink().frames.len(), 1);
    }

    #[test]
    fn test_source_failure_is_fatal() {
        let mut driver = PlaybackDriver::new(
            source(vec![snap(0, 0.0, vec![]), Err(truncated())]),
            MemorySink::new(),
            Duration::from_millis(10),
        );

        assert!(driver.advance().is_ok());
        assert!(matches!(driver.advance(), Err(PlaybackError::Source(_))));
        assert_eq!(driver.summary().unwrap().reason, FinishReason::Failed);
    }

    #[test]
    fn test_stop_from_idle() {
        let mut driver = PlaybackDriver::new(
            source(vec![snap(0, 0.0, vec![])]),
            MemorySink::new(),
            Duration::from_millis(10),
        );

        assert!(driver.summary().is_none());
        assert_eq!(
            driver.stop().unwrap(),
            PlaybackState::Finished(FinishReason::Stopped)
        );
        assert_eq!(driver.frames_rendered(), 0);
        assert!(!driver.holds_source());
    }

    #[tokio::test]
    async fn test_run_to_end_of_log() {
        let clock = VirtualClock::new();
        let stop = StopSignal::new();
        let mut driver = PlaybackDriver::new(
            source(vec![
                snap(0, 0.0, vec![TrackedObject::new("a", 4.0, 0.0)]),
                snap(1_000_000_000, 1.0, vec![TrackedObject::new("a", 4.0, 0.0)]),
                snap(2_000_000_000, 2.0, vec![TrackedObject::new("a", 4.0, 0.0)]),
            ]),
            MemorySink::new(),
            Duration::from_millis(100),
        );

        let summary = driver.run(&clock, &stop).await.unwrap();

        assert_eq!(summary.reason, FinishReason::EndOfLog);
        assert_eq!(summary.frames_rendered, 3);
        let closest = summary.closest_approach.unwrap();
        assert_eq!(closest.distance, 2.0);
        assert_eq!(closest.timestamp, 2_000_000_000);
        assert_eq!(closest.object_id.as_str(), "a");

        // One tick after every drawn frame
        assert_eq!(clock.sleep_count(), 3);
        assert_eq!(clock.now(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_stop_honored_at_tick_boundary() {
        let clock = VirtualClock::new();
        let stop = StopSignal::new();
        let sink = StoppingSink {
            inner: MemorySink::new(),
            stop: stop.clone(),
            stop_at: 1,
        };
        let items = (0..10).map(|t| snap(t, 0.0, vec![])).collect();
        let mut driver = PlaybackDriver::new(source(items), sink, Duration::from_millis(100));

        let summary = driver.run(&clock, &stop).await.unwrap();

        // The frame being drawn when the stop arrived still completes
        assert_eq!(summary.reason, FinishReason::Stopped);
        assert_eq!(summary.frames_rendered, 2);
        assert_eq!(driver.sink().inner.frames.len(), 2);
        assert!(!driver.holds_source());
    }

    #[tokio::test]
    async fn test_run_propagates_sink_failure() {
        let clock = VirtualClock::new();
        let stop = StopSignal::new();
        let items = (0..5).map(|t| snap(t, 0.0, vec![])).collect();
        let mut driver = PlaybackDriver::new(source(items), MemorySink::failing_at(2), Duration::from_millis(100));

        let result = driver.run(&clock, &stop).await;

        assert!(matches!(result, Err(PlaybackError::Sink(_))));
        assert_eq!(driver.frames_rendered(), 2);
        assert_eq!(driver.sink().finished, Some(FinishReason::Failed));
    }

    #[tokio::test]
    async fn test_run_over_recorded_log() {
        use crate::config::TimestampSource;
        use crate::decoder::{ChannelBindings, RecordDecoder};
        use crate::merger::merge_log;
        use crate::source::fixtures::{write_mcap, SESSION};
        use crate::source::McapLog;

        let log = McapLog::from_bytes(write_mcap(SESSION), TimestampSource::PublishTime);
        let decoder = RecordDecoder::new(ChannelBindings {
            pose: "odometry".to_string(),
            objects: "tracked_objects".to_string(),
            extents: Some("robot_extents".to_string()),
        });
        let extents = log.robot_extents(&decoder).unwrap();
        let merger = merge_log(&log, &decoder).unwrap();

        let clock = VirtualClock::new();
        let stop = StopSignal::new();
        let mut driver = PlaybackDriver::new(merger, MemorySink::new(), Duration::from_millis(100))
            .with_robot_extents(extents);

        let summary = driver.run(&clock, &stop).await.unwrap();

        assert_eq!(summary.reason, FinishReason::EndOfLog);
        assert_eq!(summary.frames_rendered, 3);
        assert_eq!(summary.merge_stats.decode_errors, 1);
        let closest = summary.closest_approach.unwrap();
        assert_eq!(closest.distance, 1.0);
        assert_eq!(closest.timestamp, 300);

        let sink = driver.into_sink();
        assert_eq!(sink.robot_extents, Some(Extents::new(0.6, 0.4)));
        assert!(sink.frames[0].nearest.is_none());
        assert_eq!(sink.frames[1].nearest.distance, Some(3.0));
    }

    #[tokio::test]
    async fn test_run_with_stop_already_requested() {
        let clock = VirtualClock::new();
        let stop = StopSignal::new();
        stop.request_stop();
        let mut driver = PlaybackDriver::new(
            source(vec![snap(0, 0.0, vec![])]),
            MemorySink::new(),
            Duration::from_millis(100),
        );

        let summary = driver.run(&clock, &stop).await.unwrap();
        assert_eq!(summary.reason, FinishReason::Stopped);
        assert_eq!(summary.frames_rendered, 0);
        assert_eq!(clock.sleep_count(), 0);
    }
}
