//! Rerun render sink.
//!
//! Draws each frame into a Rerun recording:
//! - the robot footprint (blue) and its accumulated trail
//! - obstacle footprints and centres (red), the nearest one highlighted
//! - a green line from the robot to the nearest obstacle, labelled with the
//!   distance at its midpoint
//! - the nearest distance as a scalar time series
//!
//! Enable with the `visualization` feature flag.

use crate::render::{footprint_outline, FinishReason, FrameCommand, RenderSink, SinkError};
use crate::types::Extents;
use nalgebra::Point2;
use rerun::{RecordingStream, RecordingStreamBuilder};

/// Footprint drawn for obstacles whose tracker reports no extents.
const DEFAULT_OBSTACLE_EXTENTS: Extents = Extents { x: 0.2, y: 0.2 };

const ROBOT_COLOR: [u8; 4] = [0, 0, 255, 255]; // Blue
const OBSTACLE_COLOR: [u8; 4] = [255, 0, 0, 255]; // Red
const NEAREST_COLOR: [u8; 4] = [255, 165, 0, 255]; // Orange
const LINE_COLOR: [u8; 4] = [0, 160, 0, 255]; // Green

fn xy(p: &Point2<f64>) -> [f32; 2] {
    [p.x as f32, p.y as f32]
}

fn outline(points: &[Point2<f64>]) -> Vec<[f32; 2]> {
    points.iter().map(xy).collect()
}

/// Render sink backed by a Rerun recording stream.
pub struct RerunSink {
    rec: RecordingStream,
    view_half_extent: f64,
    robot_extents: Extents,
    trail: Vec<[f32; 2]>,
}

impl RerunSink {
    /// Spawns a Rerun viewer and streams frames to it.
    pub fn spawn(app_id: &str, view_half_extent: f64) -> Result<Self, SinkError> {
        let rec = RecordingStreamBuilder::new(app_id)
            .spawn()
            .map_err(SinkError::backend)?;
        Ok(Self::with_stream(rec, view_half_extent))
    }

    /// Writes frames to an `.rrd` file instead of a live viewer.
    pub fn save(app_id: &str, path: &str, view_half_extent: f64) -> Result<Self, SinkError> {
        let rec = RecordingStreamBuilder::new(app_id)
            .save(path)
            .map_err(SinkError::backend)?;
        Ok(Self::with_stream(rec, view_half_extent))
    }

    fn with_stream(rec: RecordingStream, view_half_extent: f64) -> Self {
        Self {
            rec,
            view_half_extent,
            robot_extents: Extents::new(0.0, 0.0),
            trail: Vec::new(),
        }
    }

    fn log_frame(&mut self, frame: &FrameCommand<'_>) -> rerun::RecordingStreamResult<()> {
        self.rec.set_time_sequence("frame", frame.frame_index as i64);
        self.rec.set_time(
            "log_time",
            rerun::time::Timestamp::from_nanos_since_epoch(frame.timestamp as i64),
        );

        let robot = frame.robot_position();
        self.trail.push(xy(&robot));

        let robot_outline = footprint_outline(&robot, &self.robot_extents, frame.robot.orientation);
        self.rec.log(
            "world/robot/footprint",
            &rerun::LineStrips2D::new([outline(&robot_outline)]).with_colors([ROBOT_COLOR]),
        )?;
        self.rec.log(
            "world/robot/trail",
            &rerun::Points2D::new(self.trail.iter().copied())
                .with_colors([ROBOT_COLOR])
                .with_radii([0.03]),
        )?;

        let nearest_idx = frame.nearest_index();
        let strips: Vec<Vec<[f32; 2]>> = frame
            .obstacles
            .iter()
            .map(|obj| {
                let extents = obj.extents.unwrap_or(DEFAULT_OBSTACLE_EXTENTS);
                outline(&footprint_outline(&obj.position, &extents, obj.heading.unwrap_or(0.0)))
            })
            .collect();
        let colors: Vec<[u8; 4]> = (0..frame.obstacles.len())
            .map(|idx| if Some(idx) == nearest_idx { NEAREST_COLOR } else { OBSTACLE_COLOR })
            .collect();

        self.rec.log(
            "world/obstacles/footprints",
            &rerun::LineStrips2D::new(strips).with_colors(colors.clone()),
        )?;
        self.rec.log(
            "world/obstacles/centers",
            &rerun::Points2D::new(frame.obstacle_positions().iter().map(xy))
                .with_colors(colors)
                .with_labels(frame.obstacles.iter().map(|o| o.id.to_string())),
        )?;

        match (frame.nearest_obstacle(), frame.label_anchor(), frame.distance_label()) {
            (Some(nearest), Some(anchor), Some(label)) => {
                self.rec.log(
                    "world/nearest/line",
                    &rerun::LineStrips2D::new([[xy(&robot), xy(&nearest.position)]])
                        .with_colors([LINE_COLOR]),
                )?;
                self.rec.log(
                    "world/nearest/label",
                    &rerun::Points2D::new([xy(&anchor)])
                        .with_radii([0.0])
                        .with_labels([label]),
                )?;
            }
            _ => {
                self.rec.log("world/nearest", &rerun::Clear::recursive())?;
            }
        }

        if let Some(d) = frame.nearest_distance() {
            self.rec.log("metrics/nearest_distance", &rerun::Scalars::new([d]))?;
        }

        Ok(())
    }
}

impl RenderSink for RerunSink {
    fn begin(&mut self, robot_extents: Option<Extents>) -> Result<(), SinkError> {
        if let Some(extents) = robot_extents {
            self.robot_extents = extents;
        }

        // Fixed view bounds around the map origin
        let h = self.view_half_extent as f32;
        self.rec
            .log_static(
                "world/bounds",
                &rerun::LineStrips2D::new([[[-h, -h], [h, -h], [h, h], [-h, h], [-h, -h]]])
                    .with_colors([[128, 128, 128, 255]]),
            )
            .map_err(SinkError::backend)?;

        tracing::info!("Rerun visualization enabled - open Rerun Viewer to see playback");
        Ok(())
    }

    fn draw(&mut self, frame: &FrameCommand<'_>) -> Result<(), SinkError> {
        self.log_frame(frame).map_err(SinkError::backend)
    }

    fn finish(&mut self, reason: FinishReason) -> Result<(), SinkError> {
        self.rec
            .log(
                "logs/playback",
                &rerun::TextLog::new(format!("Playback finished: {:?}", reason)),
            )
            .map_err(SinkError::backend)?;
        let _ = self.rec.flush_blocking();
        Ok(())
    }
}
