//! Stream merger: two timestamped streams → ordered World Snapshots.
//!
//! The pose stream and the object stream are each wrapped so the merger can
//! peek the next timestamp without consuming it. Every step takes the
//! smallest pending timestamp, applies all pose events at that timestamp,
//! then all object events at that timestamp, and emits one snapshot carrying
//! the last known value of each stream.
//!
//! ```text
//! poses    ●─────────────●───────────
//!          t0            t2
//! objects  ───────●────────────●─────
//!                 t1           t3
//! emitted  S(t0)  S(t1)  S(t2) S(t3)
//!          P0/∅   P0/O1  P2/O1 P2/O3
//! ```
//!
//! A stream that goes backwards in time has the offending record dropped
//! with a warning. Decode failures are also dropped with a warning; both are
//! counted in [`MergeStats`]. Only container errors end the sequence.

use crate::decoder::{DecodeError, Decoded, RawRecord, RecordDecoder};
use crate::source::{ChannelRecords, LogError, McapLog};
use crate::types::{ObjectSet, Pose, Timestamp, WorldSnapshot};
use thiserror::Error;
use tracing::warn;

/// Something that went wrong while pulling one record from a stream.
#[derive(Debug, Error)]
pub enum RecordFault {
    /// Recoverable: the record is skipped
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Fatal: the stream cannot continue
    #[error(transparent)]
    Source(#[from] LogError),
}

/// Records that carry their own timestamp.
pub trait Timestamped {
    fn timestamp(&self) -> Timestamp;
}

impl Timestamped for Pose {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Timestamped for ObjectSet {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

/// Adapts a raw channel iterator into a stream of one decoded record type.
///
/// Records that decode to another role (or to nothing) are skipped.
pub struct DecodedStream<I, T> {
    raw: I,
    decoder: RecordDecoder,
    pick: fn(Decoded) -> Option<T>,
}

impl<I> DecodedStream<I, Pose>
where
    I: Iterator<Item = Result<RawRecord, LogError>>,
{
    /// Decodes a channel as the pose stream.
    pub fn poses(raw: I, decoder: RecordDecoder) -> Self {
        Self {
            raw,
            decoder,
            pick: |decoded| match decoded {
                Decoded::Pose(pose) => Some(pose),
                _ => None,
            },
        }
    }
}

impl<I> DecodedStream<I, ObjectSet>
where
    I: Iterator<Item = Result<RawRecord, LogError>>,
{
    /// Decodes a channel as the object stream.
    pub fn objects(raw: I, decoder: RecordDecoder) -> Self {
        Self {
            raw,
            decoder,
            pick: |decoded| match decoded {
                Decoded::Objects(set) => Some(set),
                _ => None,
            },
        }
    }
}

impl<I, T> Iterator for DecodedStream<I, T>
where
    I: Iterator<Item = Result<RawRecord, LogError>>,
{
    type Item = Result<T, RecordFault>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = match self.raw.next()? {
                Ok(raw) => raw,
                Err(e) => return Some(Err(e.into())),
            };

            match self.decoder.decode(&raw) {
                Ok(decoded) => {
                    if let Some(record) = (self.pick)(decoded) {
                        return Some(Ok(record));
                    }
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Counters describing one merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Pose records applied
    pub pose_events: u64,

    /// Object-set records applied
    pub object_events: u64,

    /// Snapshots emitted
    pub snapshots: u64,

    /// Records dropped because they failed to decode
    pub decode_errors: u64,

    /// Records dropped because their stream went backwards in time
    pub order_violations: u64,

    /// Steps that produced no snapshot because no pose had arrived yet
    pub suppressed_without_pose: u64,
}

/// One input stream with a one-record lookahead.
struct PeekableStream<T, I> {
    inner: I,
    role: &'static str,
    head: Option<T>,
    last_accepted: Option<Timestamp>,
    exhausted: bool,
}

impl<T, I> PeekableStream<T, I>
where
    T: Timestamped,
    I: Iterator<Item = Result<T, RecordFault>>,
{
    fn new(inner: I, role: &'static str) -> Self {
        Self {
            inner,
            role,
            head: None,
            last_accepted: None,
            exhausted: false,
        }
    }

    /// Fills the lookahead slot and returns its timestamp.
    fn peek_timestamp(&mut self, stats: &mut MergeStats) -> Result<Option<Timestamp>, LogError> {
        while self.head.is_none() && !self.exhausted {
            match self.inner.next() {
                None => self.exhausted = true,
                Some(Ok(record)) => {
                    let ts = record.timestamp();
                    match self.last_accepted {
                        Some(last) if ts < last => {
                            stats.order_violations += 1;
                            warn!(
                                "Dropping out-of-order {} record: t={} after t={}",
                                self.role, ts, last
                            );
                        }
                        _ => {
                            self.last_accepted = Some(ts);
                            self.head = Some(record);
                        }
                    }
                }
                Some(Err(RecordFault::Decode(e))) => {
                    stats.decode_errors += 1;
                    warn!("Skipping undecodable {} record: {}", self.role, e);
                }
                Some(Err(RecordFault::Source(e))) => {
                    self.exhausted = true;
                    return Err(e);
                }
            }
        }

        Ok(self.head.as_ref().map(Timestamped::timestamp))
    }

    /// Takes the lookahead record if it is stamped exactly `ts`.
    fn take_at(&mut self, ts: Timestamp) -> Option<T> {
        if self.head.as_ref().map(Timestamped::timestamp) == Some(ts) {
            self.head.take()
        } else {
            None
        }
    }
}

/// Lazily merges a pose stream and an object stream into World Snapshots.
///
/// Single forward pass; to replay again, reopen the log.
pub struct StreamMerger<P, O> {
    poses: PeekableStream<Pose, P>,
    objects: PeekableStream<ObjectSet, O>,
    current_pose: Option<Pose>,
    current_objects: Option<ObjectSet>,
    stats: MergeStats,
    failed: bool,
}

impl<P, O> StreamMerger<P, O>
where
    P: Iterator<Item = Result<Pose, RecordFault>>,
    O: Iterator<Item = Result<ObjectSet, RecordFault>>,
{
    pub fn new(poses: P, objects: O) -> Self {
        Self {
            poses: PeekableStream::new(poses, "pose"),
            objects: PeekableStream::new(objects, "objects"),
            current_pose: None,
            current_objects: None,
            stats: MergeStats::default(),
            failed: false,
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    fn step(&mut self) -> Result<Option<WorldSnapshot>, LogError> {
        loop {
            let next_pose = self.poses.peek_timestamp(&mut self.stats)?;
            let next_objects = self.objects.peek_timestamp(&mut self.stats)?;

            let ts = match (next_pose, next_objects) {
                (None, None) => return Ok(None),
                (Some(p), None) => p,
                (None, Some(o)) => o,
                (Some(p), Some(o)) => p.min(o),
            };

            // Pose before objects at equal timestamps; duplicates within a
            // stream collapse to the last one
            while let Some(pose) = self.poses.take_at(ts) {
                self.stats.pose_events += 1;
                self.current_pose = Some(pose);
                self.poses.peek_timestamp(&mut self.stats)?;
            }
            while let Some(set) = self.objects.take_at(ts) {
                self.stats.object_events += 1;
                self.current_objects = Some(set);
                self.objects.peek_timestamp(&mut self.stats)?;
            }

            let Some(pose) = &self.current_pose else {
                self.stats.suppressed_without_pose += 1;
                continue;
            };

            self.stats.snapshots += 1;
            return Ok(Some(WorldSnapshot {
                timestamp: ts,
                pose: pose.clone(),
                objects: self
                    .current_objects
                    .as_ref()
                    .map(|set| set.objects.clone())
                    .unwrap_or_default(),
            }));
        }
    }
}

/// Merger over the pose and object channels of an opened log.
pub type LogMerger<'a> = StreamMerger<
    DecodedStream<ChannelRecords<'a>, Pose>,
    DecodedStream<ChannelRecords<'a>, ObjectSet>,
>;

/// Opens the bound pose and object channels of `log` and merges them.
pub fn merge_log<'a>(log: &'a McapLog, decoder: &RecordDecoder) -> Result<LogMerger<'a>, LogError> {
    let bindings = decoder.bindings();
    let poses = DecodedStream::poses(log.channel(&bindings.pose)?, decoder.clone());
    let objects = DecodedStream::objects(log.channel(&bindings.objects)?, decoder.clone());
    Ok(StreamMerger::new(poses, objects))
}

impl<P, O> Iterator for StreamMerger<P, O>
where
    P: Iterator<Item = Result<Pose, RecordFault>>,
    O: Iterator<Item = Result<ObjectSet, RecordFault>>,
{
    type Item = Result<WorldSnapshot, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.step() {
            Ok(snapshot) => snapshot.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
