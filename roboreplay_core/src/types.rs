//! Domain records shared by every stage of the replay pipeline.
//!
//! All of these are transient: built from one log record (or one merge
//! step), handed to the next stage, and dropped.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Log time in nanoseconds (the MCAP time base).
pub type Timestamp = u64;

/// Converts a log timestamp to seconds for display.
pub fn timestamp_secs(timestamp: Timestamp) -> f64 {
    timestamp as f64 * 1e-9
}

/// Robot pose decoded from one odometry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Record timestamp (ns)
    pub timestamp: Timestamp,

    /// Position in the map frame (metres)
    pub position: Point2<f64>,

    /// Heading in radians
    pub orientation: f64,
}

impl Pose {
    pub fn new(timestamp: Timestamp, x: f64, y: f64, orientation: f64) -> Self {
        Self {
            timestamp,
            position: Point2::new(x, y),
            orientation,
        }
    }
}

/// Identifier of a tracked object, unique within one object set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rectangular footprint [x-size, y-size] in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extents {
    pub x: f64,
    pub y: f64,
}

impl Extents {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One obstacle reported by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub id: ObjectId,

    /// Position in the map frame (metres)
    pub position: Point2<f64>,

    /// Heading in radians, if the tracker reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,

    /// Footprint, if the tracker reports one (drawing only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extents: Option<Extents>,
}

impl TrackedObject {
    /// Creates a point obstacle with no heading or footprint.
    pub fn new(id: impl Into<ObjectId>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            position: Point2::new(x, y),
            heading: None,
            extents: None,
        }
    }
}

/// All objects reported at one timestamp, in tracker order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectSet {
    pub timestamp: Timestamp,
    pub objects: Vec<TrackedObject>,
}

impl ObjectSet {
    pub fn new(timestamp: Timestamp, objects: Vec<TrackedObject>) -> Self {
        Self { timestamp, objects }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Merged world state at one instant.
///
/// `timestamp` is the timestamp of the event that produced the snapshot;
/// `pose` and `objects` are the latest values seen on their streams and may
/// be older than it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub timestamp: Timestamp,
    pub pose: Pose,
    pub objects: Vec<TrackedObject>,
}

/// Outcome of the nearest-obstacle search for one snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NearestResult {
    /// Identifier of the nearest object, `None` when there are no objects
    pub object_id: Option<ObjectId>,

    /// Position of the nearest object within the snapshot's object list
    pub index: Option<usize>,

    /// Euclidean distance in metres, `None` when there are no objects
    pub distance: Option<f64>,
}

impl NearestResult {
    /// The "no nearest object" result.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.index.is_none()
    }
}
