//! Record decoder: raw log entries → typed domain records.
//!
//! Payloads are JSON documents, one per message:
//!
//! ```text
//! odometry         {"x": 1.0, "y": 2.0, "theta": 0.3}
//! tracked_objects  {"objects": [{"id": "a", "pose": {"x": 3.0, "y": 0.0, "theta": 0.0},
//!                                "extents": {"x": 0.5, "y": 0.5}}]}
//! robot_extents    {"x": 0.6, "y": 0.4}
//! ```
//!
//! Which channel plays which role comes from [`ChannelBindings`]; records on
//! any other channel decode to [`Decoded::Unrecognized`].

use crate::types::{Extents, ObjectId, ObjectSet, Pose, Timestamp, TrackedObject};
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

/// One undecoded message as handed over by the log source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Channel (topic) the record was logged on
    pub channel: String,

    /// Record timestamp (ns), already resolved to the configured time source
    pub timestamp: Timestamp,

    /// Serialized message body
    pub payload: Vec<u8>,
}

impl RawRecord {
    pub fn new(channel: impl Into<String>, timestamp: Timestamp, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            channel: channel.into(),
            timestamp,
            payload: payload.into(),
        }
    }
}

/// Binds channel names to stream roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBindings {
    pub pose: String,
    pub objects: String,
    pub extents: Option<String>,
}

/// Result of decoding one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Pose(Pose),
    Objects(ObjectSet),
    Extents(Extents),
    /// Record on a channel with no role; skipped by callers
    Unrecognized,
}

/// A record whose payload does not match its channel's schema.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed payload on '{channel}' at t={timestamp}: {source}")]
    Malformed {
        channel: String,
        timestamp: Timestamp,
        #[source]
        source: serde_json::Error,
    },

    #[error("Non-finite {field} on '{channel}' at t={timestamp}")]
    NonFinite {
        channel: String,
        timestamp: Timestamp,
        field: &'static str,
    },

    #[error("Duplicate object id '{id}' on '{channel}' at t={timestamp}")]
    DuplicateId {
        channel: String,
        timestamp: Timestamp,
        id: String,
    },
}

impl DecodeError {
    /// Timestamp of the record that failed to decode.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DecodeError::Malformed { timestamp, .. }
            | DecodeError::NonFinite { timestamp, .. }
            | DecodeError::DuplicateId { timestamp, .. } => *timestamp,
        }
    }
}

#[derive(Deserialize)]
struct PosePayload {
    x: f64,
    y: f64,
    theta: f64,
}

#[derive(Deserialize)]
struct ExtentsPayload {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdPayload {
    Text(String),
    Number(u64),
}

#[derive(Deserialize)]
struct ObjectPosePayload {
    x: f64,
    y: f64,
    #[serde(default)]
    theta: Option<f64>,
}

#[derive(Deserialize)]
struct ObjectPayload {
    #[serde(default)]
    id: Option<IdPayload>,
    pose: ObjectPosePayload,
    #[serde(default)]
    extents: Option<ExtentsPayload>,
}

#[derive(Deserialize)]
struct ObjectsPayload {
    objects: Vec<ObjectPayload>,
}

/// Decodes raw records according to a set of channel bindings.
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    bindings: ChannelBindings,
}

impl RecordDecoder {
    pub fn new(bindings: ChannelBindings) -> Self {
        Self { bindings }
    }

    pub fn bindings(&self) -> &ChannelBindings {
        &self.bindings
    }

    /// Decodes one record. Unbound channels are `Ok(Decoded::Unrecognized)`.
    pub fn decode(&self, record: &RawRecord) -> Result<Decoded, DecodeError> {
        let channel = record.channel.as_str();

        if channel == self.bindings.pose {
            self.decode_pose(record).map(Decoded::Pose)
        } else if channel == self.bindings.objects {
            self.decode_objects(record).map(Decoded::Objects)
        } else if self.bindings.extents.as_deref() == Some(channel) {
            self.decode_extents(record).map(Decoded::Extents)
        } else {
            Ok(Decoded::Unrecognized)
        }
    }

    fn decode_pose(&self, record: &RawRecord) -> Result<Pose, DecodeError> {
        let payload: PosePayload = parse(record)?;
        check_finite(record, "pose position", &[payload.x, payload.y])?;
        check_finite(record, "pose heading", &[payload.theta])?;

        Ok(Pose::new(record.timestamp, payload.x, payload.y, payload.theta))
    }

    fn decode_objects(&self, record: &RawRecord) -> Result<ObjectSet, DecodeError> {
        let payload: ObjectsPayload = parse(record)?;
        let mut seen = HashSet::with_capacity(payload.objects.len());
        let mut objects = Vec::with_capacity(payload.objects.len());

        for (index, obj) in payload.objects.into_iter().enumerate() {
            check_finite(record, "object position", &[obj.pose.x, obj.pose.y])?;
            if let Some(theta) = obj.pose.theta {
                check_finite(record, "object heading", &[theta])?;
            }
            if let Some(ext) = &obj.extents {
                check_finite(record, "object extents", &[ext.x, ext.y])?;
            }

            // Trackers without ids get positional ids
            let id = match obj.id {
                Some(IdPayload::Text(s)) => s,
                Some(IdPayload::Number(n)) => n.to_string(),
                None => index.to_string(),
            };
            if !seen.insert(id.clone()) {
                return Err(DecodeError::DuplicateId {
                    channel: record.channel.clone(),
                    timestamp: record.timestamp,
                    id,
                });
            }

            let mut tracked = TrackedObject::new(ObjectId(id), obj.pose.x, obj.pose.y);
            tracked.heading = obj.pose.theta;
            tracked.extents = obj.extents.map(|e| Extents::new(e.x, e.y));
            objects.push(tracked);
        }

        Ok(ObjectSet::new(record.timestamp, objects))
    }

    fn decode_extents(&self, record: &RawRecord) -> Result<Extents, DecodeError> {
        let payload: ExtentsPayload = parse(record)?;
        check_finite(record, "robot extents", &[payload.x, payload.y])?;
        Ok(Extents::new(payload.x, payload.y))
    }
}

fn parse<'a, T: Deserialize<'a>>(record: &'a RawRecord) -> Result<T, DecodeError> {
    serde_json::from_slice(&record.payload).map_err(|source| DecodeError::Malformed {
        channel: record.channel.clone(),
        timestamp: record.timestamp,
        source,
    })
}

fn check_finite(record: &RawRecord, field: &'static str, values: &[f64]) -> Result<(), DecodeError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(DecodeError::NonFinite {
            channel: record.channel.clone(),
            timestamp: record.timestamp,
            field,
        })
    }
}
