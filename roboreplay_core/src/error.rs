//! Top-level error for a complete replay run.

use crate::config::ConfigError;
use crate::player::PlaybackError;
use crate::render::SinkError;
use crate::source::LogError;
use thiserror::Error;

/// Any fatal condition that ends a replay.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl From<SinkError> for ReplayError {
    fn from(e: SinkError) -> Self {
        ReplayError::Playback(PlaybackError::Sink(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_error_is_playback_error() {
        let err: ReplayError = SinkError::Closed.into();
        assert!(matches!(err, ReplayError::Playback(PlaybackError::Sink(_))));
        assert_eq!(err.to_string(), "Render sink failed: Render sink closed");
    }

    #[test]
    fn test_config_error_message() {
        let err: ReplayError = ConfigError::Invalid("tick_interval_secs must be positive".into()).into();
        assert!(err.to_string().starts_with("Configuration error:"));
    }
}
