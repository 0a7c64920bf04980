//! RoboReplay Core - Log replay and nearest-obstacle synchronization
//!
//! Replays a recorded robot session from an MCAP log as an animation:
//! 1. **Decoding**: raw channel records → poses and tracked-object sets
//! 2. **Merging**: two independently timed streams → one ordered sequence of
//!    World Snapshots with last-known-value semantics
//! 3. **Evaluation**: nearest obstacle to the robot in every snapshot
//! 4. **Playback**: one snapshot per tick, forwarded to a render sink
//!
//! ```text
//! McapLog ─► ChannelRecords ─► DecodedStream ─┐
//!                                             ├─► StreamMerger ─► PlaybackDriver ─► RenderSink
//! McapLog ─► ChannelRecords ─► DecodedStream ─┘        (nearest::evaluate per frame)
//! ```

pub mod config;
pub mod decoder;
pub mod error;
pub mod merger;
pub mod nearest;
pub mod player;
pub mod render;
pub mod source;
pub mod types;

// Visualization module (optional, requires 'visualization' feature)
#[cfg(feature = "visualization")]
pub mod visualization;

// Re-export key types for convenience
pub use config::{ConfigError, ReplayConfig, TimestampSource};
pub use decoder::{ChannelBindings, DecodeError, Decoded, RawRecord, RecordDecoder};
pub use error::ReplayError;
pub use merger::{merge_log, LogMerger, MergeStats, StreamMerger};
pub use player::{ClosestApproach, PlaybackDriver, PlaybackError, PlaybackState, PlaybackSummary, SnapshotSource};
pub use render::{FinishReason, FrameCommand, MemorySink, RenderSink, SinkError, TracingSink};
pub use source::{LogError, McapLog};
pub use types::{Extents, NearestResult, ObjectId, ObjectSet, Pose, Timestamp, TrackedObject, WorldSnapshot};

#[cfg(feature = "visualization")]
pub use visualization::RerunSink;
