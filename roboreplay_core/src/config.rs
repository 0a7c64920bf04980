//! Replay configuration.
//!
//! Defaults match the channel layout of the reference recordings
//! (`odometry`, `tracked_objects`, `robot_extents`). A JSON file may override
//! any subset of fields; the binary then applies its command-line flags.

use crate::decoder::ChannelBindings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Which MCAP message time drives the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// Time the producer published the message
    #[default]
    PublishTime,
    /// Time the recorder logged the message
    LogTime,
}

impl std::str::FromStr for TimestampSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "publish_time" | "publish" => Ok(TimestampSource::PublishTime),
            "log_time" | "log" => Ok(TimestampSource::LogTime),
            _ => Err(format!("Unknown timestamp source: {}", s)),
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Configuration for one replay session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Render cadence in seconds (default: 0.1)
    pub tick_interval_secs: f64,

    /// Channel carrying robot odometry
    pub pose_channel: String,

    /// Channel carrying tracked-object lists
    pub objects_channel: String,

    /// Channel carrying the robot footprint, if any
    pub extents_channel: Option<String>,

    /// Message time used for ordering
    pub timestamp_source: TimestampSource,

    /// Half-width of the square view around the origin (metres)
    pub view_half_extent: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 0.1,
            pose_channel: "odometry".to_string(),
            objects_channel: "tracked_objects".to_string(),
            extents_channel: Some("robot_extents".to_string()),
            timestamp_source: TimestampSource::PublishTime,
            view_half_extent: 6.0,
        }
    }
}

impl ReplayConfig {
    /// Loads a config from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: ReplayConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that would otherwise break playback.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_secs <= 0.0 || Duration::try_from_secs_f64(self.tick_interval_secs).is_err() {
            return Err(ConfigError::Invalid(format!(
                "tick_interval_secs must be a positive duration, got {}",
                self.tick_interval_secs
            )));
        }
        if self.pose_channel.is_empty() || self.objects_channel.is_empty() {
            return Err(ConfigError::Invalid(
                "pose_channel and objects_channel must be non-empty".to_string(),
            ));
        }
        if self.pose_channel == self.objects_channel {
            return Err(ConfigError::Invalid(format!(
                "pose and objects streams are both bound to '{}'",
                self.pose_channel
            )));
        }
        if !self.view_half_extent.is_finite() || self.view_half_extent <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "view_half_extent must be positive, got {}",
                self.view_half_extent
            )));
        }
        Ok(())
    }

    /// Render cadence as a `Duration`.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.tick_interval_secs)
    }

    /// Channel-to-role mapping for the decoder.
    pub fn bindings(&self) -> ChannelBindings {
        ChannelBindings {
            pose: self.pose_channel.clone(),
            objects: self.objects_channel.clone(),
            extents: self.extents_channel.clone(),
        }
    }
}
