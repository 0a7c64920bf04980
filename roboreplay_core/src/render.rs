//! Render sink interface and the headless sinks.
//!
//! A sink receives one [`FrameCommand`] per tick. Any error it returns stops
//! playback: a skipped frame would show a jump in the animation.

use crate::types::{timestamp_secs, Extents, NearestResult, Pose, Timestamp, TrackedObject};
use nalgebra::{Point2, Rotation2, Vector2};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by a render sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Render backend error: {0}")]
    Backend(String),

    #[error("Render sink closed")]
    Closed,
}

impl SinkError {
    /// Creates a backend error from any displayable cause.
    pub fn backend(cause: impl std::fmt::Display) -> Self {
        Self::Backend(cause.to_string())
    }
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameCommand<'a> {
    /// Zero-based frame counter
    pub frame_index: u64,

    /// Snapshot timestamp (ns)
    pub timestamp: Timestamp,

    pub robot: &'a Pose,

    /// Obstacles in tracker order
    pub obstacles: &'a [TrackedObject],

    pub nearest: &'a NearestResult,

    /// Robot footprint, when the log provides one
    pub robot_extents: Option<Extents>,
}

impl<'a> FrameCommand<'a> {
    pub fn robot_position(&self) -> Point2<f64> {
        self.robot.position
    }

    pub fn obstacle_positions(&self) -> Vec<Point2<f64>> {
        self.obstacles.iter().map(|o| o.position).collect()
    }

    pub fn nearest_index(&self) -> Option<usize> {
        self.nearest.index
    }

    pub fn nearest_distance(&self) -> Option<f64> {
        self.nearest.distance
    }

    pub fn nearest_obstacle(&self) -> Option<&'a TrackedObject> {
        self.nearest.index.and_then(|idx| self.obstacles.get(idx))
    }

    /// Midpoint of the robot → nearest-obstacle segment, where the distance
    /// label is drawn.
    pub fn label_anchor(&self) -> Option<Point2<f64>> {
        self.nearest_obstacle()
            .map(|obj| nalgebra::center(&self.robot.position, &obj.position))
    }

    /// Distance text, two decimals in metres.
    pub fn distance_label(&self) -> Option<String> {
        self.nearest.distance.map(|d| format!("{:.2}", d))
    }
}

/// Closed outline of a rectangular footprint centred on `center` and rotated
/// by `heading` radians. The first corner is repeated at the end.
pub fn footprint_outline(center: &Point2<f64>, extents: &Extents, heading: f64) -> [Point2<f64>; 5] {
    let rot = Rotation2::new(heading);
    let (hx, hy) = (extents.x / 2.0, extents.y / 2.0);
    let corner = |dx: f64, dy: f64| center + rot * Vector2::new(dx, dy);

    let first = corner(-hx, -hy);
    [first, corner(hx, -hy), corner(hx, hy), corner(-hx, hy), first]
}

/// Why playback ended, as reported to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The log ran out of snapshots
    EndOfLog,
    /// A stop was requested
    Stopped,
    /// A fatal error ended playback
    Failed,
}

/// Per-frame drawing target driven by the playback loop.
pub trait RenderSink {
    /// Called once before the first frame.
    fn begin(&mut self, _robot_extents: Option<Extents>) -> Result<(), SinkError> {
        Ok(())
    }

    /// Draws one frame.
    fn draw(&mut self, frame: &FrameCommand<'_>) -> Result<(), SinkError>;

    /// Called once when playback reaches its terminal state.
    fn finish(&mut self, _reason: FinishReason) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: RenderSink + ?Sized> RenderSink for Box<S> {
    fn begin(&mut self, robot_extents: Option<Extents>) -> Result<(), SinkError> {
        (**self).begin(robot_extents)
    }

    fn draw(&mut self, frame: &FrameCommand<'_>) -> Result<(), SinkError> {
        (**self).draw(frame)
    }

    fn finish(&mut self, reason: FinishReason) -> Result<(), SinkError> {
        (**self).finish(reason)
    }
}

/// An owned copy of a drawn frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub frame_index: u64,
    pub timestamp: Timestamp,
    pub robot: Pose,
    pub obstacles: Vec<TrackedObject>,
    pub nearest: NearestResult,
}

/// Sink that keeps every frame in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub frames: Vec<CapturedFrame>,
    pub robot_extents: Option<Extents>,
    pub finished: Option<FinishReason>,

    /// Rejects the frame with this index, for exercising failure paths
    pub fail_at: Option<u64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that fails when asked to draw frame `frame_index`.
    pub fn failing_at(frame_index: u64) -> Self {
        Self {
            fail_at: Some(frame_index),
            ..Self::default()
        }
    }
}

impl RenderSink for MemorySink {
    fn begin(&mut self, robot_extents: Option<Extents>) -> Result<(), SinkError> {
        self.robot_extents = robot_extents;
        Ok(())
    }

    fn draw(&mut self, frame: &FrameCommand<'_>) -> Result<(), SinkError> {
        if self.fail_at == Some(frame.frame_index) {
            return Err(SinkError::backend(format!("frame {} rejected", frame.frame_index)));
        }
        self.frames.push(CapturedFrame {
            frame_index: frame.frame_index,
            timestamp: frame.timestamp,
            robot: frame.robot.clone(),
            obstacles: frame.obstacles.to_vec(),
            nearest: frame.nearest.clone(),
        });
        Ok(())
    }

    fn finish(&mut self, reason: FinishReason) -> Result<(), SinkError> {
        self.finished = Some(reason);
        Ok(())
    }
}

/// Headless sink that reports each frame through `tracing`.
///
/// Every frame is logged at DEBUG; a progress line with the current nearest
/// distance goes out at INFO every `report_every` frames.
pub struct TracingSink {
    report_every: u64,
}

impl TracingSink {
    pub fn new(report_every: u64) -> Self {
        Self {
            report_every: report_every.max(1),
        }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(10)
    }
}

impl RenderSink for TracingSink {
    fn begin(&mut self, robot_extents: Option<Extents>) -> Result<(), SinkError> {
        match robot_extents {
            Some(e) => info!("Robot footprint {:.2} x {:.2} m", e.x, e.y),
            None => info!("Robot footprint unknown"),
        }
        Ok(())
    }

    fn draw(&mut self, frame: &FrameCommand<'_>) -> Result<(), SinkError> {
        let robot = frame.robot_position();
        let nearest = match (frame.nearest_obstacle(), frame.distance_label()) {
            (Some(obj), Some(label)) => format!("{} at {} m", obj.id, label),
            _ => "none".to_string(),
        };

        debug!(
            "frame={} t={:.3}s robot=({:.2}, {:.2}) obstacles={} nearest={}",
            frame.frame_index,
            timestamp_secs(frame.timestamp),
            robot.x,
            robot.y,
            frame.obstacles.len(),
            nearest
        );

        if frame.frame_index % self.report_every == 0 {
            info!(
                "  t={:.1}s | obstacles={} | nearest={}",
                timestamp_secs(frame.timestamp),
                frame.obstacles.len(),
                nearest
            );
        }
        Ok(())
    }

    fn finish(&mut self, reason: FinishReason) -> Result<(), SinkError> {
        debug!("Tracing sink finished: {:?}", reason);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectId;
    use approx::assert_relative_eq;

    #[test]
    fn test_frame_accessors() {
        let robot = Pose::new(10, 0.0, 0.0, 0.0);
        let obstacles = vec![TrackedObject::new("a", 4.0, 0.0), TrackedObject::new("b", 0.0, 2.0)];
        let nearest = NearestResult {
            object_id: Some(ObjectId::from("b")),
            index: Some(1),
            distance: Some(2.0),
        };
        let frame = FrameCommand {
            frame_index: 0,
            timestamp: 10,
            robot: &robot,
            obstacles: &obstacles,
            nearest: &nearest,
            robot_extents: None,
        };

        assert_eq!(frame.obstacle_positions().len(), 2);
        assert_eq!(frame.nearest_index(), Some(1));
        assert_eq!(frame.nearest_obstacle().unwrap().id.as_str(), "b");
        assert_eq!(frame.label_anchor(), Some(Point2::new(0.0, 1.0)));
        assert_eq!(frame.distance_label().as_deref(), Some("2.00"));
    }

    #[test]
    fn test_footprint_outline_rotation() {
        let outline = footprint_outline(&Point2::new(1.0, 1.0), &Extents::new(2.0, 1.0), 0.0);
        assert_eq!(outline[0], Point2::new(0.0, 0.5));
        assert_eq!(outline[2], Point2::new(2.0, 1.5));
        assert_eq!(outline[0], outline[4]);

        let turned = footprint_outline(&Point2::origin(), &Extents::new(2.0, 1.0), std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(turned[1].x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(turned[1].y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_frame_without_nearest() {
        let robot = Pose::new(0, 1.0, 1.0, 0.0);
        let nearest = NearestResult::none();
        let frame = FrameCommand {
            frame_index: 3,
            timestamp: 0,
            robot: &robot,
            obstacles: &[],
            nearest: &nearest,
            robot_extents: None,
        };

        assert!(frame.nearest_obstacle().is_none());
        assert!(frame.label_anchor().is_none());
        assert!(frame.distance_label().is_none());
    }

    #[test]
    fn test_memory_sink_failing_frame() {
        let robot = Pose::new(0, 0.0, 0.0, 0.0);
        let nearest = NearestResult::none();
        let mut sink = MemorySink::failing_at(1);

        for idx in 0..2 {
            let frame = FrameCommand {
                frame_index: idx,
                timestamp: idx,
                robot: &robot,
                obstacles: &[],
                nearest: &nearest,
                robot_extents: None,
            };
            let result = sink.draw(&frame);
            assert_eq!(result.is_err(), idx == 1);
        }
        assert_eq!(sink.frames.len(), 1);
    }

    #[test]
    fn test_tracing_sink_accepts_frames() {
        let robot = Pose::new(0, 0.0, 0.0, 0.0);
        let nearest = NearestResult::none();
        let mut sink = TracingSink::new(0);
        let frame = FrameCommand {
            frame_index: 0,
            timestamp: 0,
            robot: &robot,
            obstacles: &[],
            nearest: &nearest,
            robot_extents: Some(Extents::new(0.5, 0.5)),
        };

        assert!(sink.begin(frame.robot_extents).is_ok());
        assert!(sink.draw(&frame).is_ok());
        assert!(sink.finish(FinishReason::EndOfLog).is_ok());
    }
}
