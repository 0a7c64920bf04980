//! MCAP log source.
//!
//! The whole container is read into memory when the log is opened, so the
//! OS file handle never outlives [`McapLog::open`]. Each channel is then
//! exposed as its own forward-only iterator over the shared buffer; two
//! channel iterators over the same log advance independently, which is what
//! the merger needs to peek both streams.

use crate::config::TimestampSource;
use crate::decoder::{Decoded, RawRecord, RecordDecoder};
use crate::types::Extents;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Fatal errors from the log container.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Failed to open log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt log container: {0}")]
    Container(#[from] mcap::McapError),
}

/// An opened MCAP recording.
pub struct McapLog {
    path: PathBuf,
    bytes: Vec<u8>,
    timestamp_source: TimestampSource,
}

impl McapLog {
    /// Reads the log at `path` into memory.
    pub fn open(path: impl AsRef<Path>, timestamp_source: TimestampSource) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&path).map_err(|source| LogError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Loaded {} ({} bytes)", path.display(), bytes.len());

        Ok(Self {
            path,
            bytes,
            timestamp_source,
        })
    }

    /// Wraps an in-memory container.
    pub fn from_bytes(bytes: Vec<u8>, timestamp_source: TimestampSource) -> Self {
        Self {
            path: PathBuf::from("<memory>"),
            bytes,
            timestamp_source,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timestamp_source(&self) -> TimestampSource {
        self.timestamp_source
    }

    /// Size of the container in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Opens a forward-only iterator over one channel's records.
    pub fn channel(&self, topic: &str) -> Result<ChannelRecords<'_>, LogError> {
        let stream = mcap::MessageStream::new(&self.bytes)?;
        Ok(ChannelRecords {
            stream,
            topic: topic.to_string(),
            timestamp_source: self.timestamp_source,
            failed: false,
        })
    }

    /// Lists the topics that carry at least one message.
    pub fn topics(&self) -> Result<BTreeSet<String>, LogError> {
        let mut topics = BTreeSet::new();
        for message in mcap::MessageStream::new(&self.bytes)? {
            topics.insert(message?.channel.topic.clone());
        }
        Ok(topics)
    }

    /// Returns the first decodable robot footprint, if the extents channel is
    /// bound and present.
    pub fn robot_extents(&self, decoder: &RecordDecoder) -> Result<Option<Extents>, LogError> {
        let Some(topic) = decoder.bindings().extents.as_deref() else {
            return Ok(None);
        };

        for record in self.channel(topic)? {
            match decoder.decode(&record?) {
                Ok(Decoded::Extents(extents)) => return Ok(Some(extents)),
                Ok(_) => {}
                Err(e) => warn!("Skipping robot extents record: {}", e),
            }
        }
        Ok(None)
    }
}

/// Iterator over the raw records of one channel.
///
/// After a container error the iterator yields the error once and then ends.
pub struct ChannelRecords<'a> {
    stream: mcap::MessageStream<'a>,
    topic: String,
    timestamp_source: TimestampSource,
    failed: bool,
}

impl Iterator for ChannelRecords<'_> {
    type Item = Result<RawRecord, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let message = match self.stream.next()? {
                Ok(message) => message,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
            };

            if message.channel.topic != self.topic {
                continue;
            }

            let timestamp = match self.timestamp_source {
                TimestampSource::PublishTime => message.publish_time,
                TimestampSource::LogTime => message.log_time,
            };

            return Some(Ok(RawRecord {
                channel: message.channel.topic.clone(),
                timestamp,
                payload: message.data.into_owned(),
            }));
        }
    }
}
