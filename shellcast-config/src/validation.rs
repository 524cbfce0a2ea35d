//! Guard rails applied to a composed [`Config`].

use thiserror::Error;

use crate::models::Config;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigGuardRailError {
    #[error("encode.segment_seconds must be greater than zero")]
    ZeroSegmentSeconds,
    #[error("encode.frame_rate must be greater than zero")]
    ZeroFrameRate,
    #[error("encode.audio_channels must be greater than zero")]
    ZeroAudioChannels,
    #[error("streams.public_prefix must not be empty")]
    EmptyPublicPrefix,
    #[error("readiness.min_segments must be at least 1")]
    ZeroMinSegments,
    #[error("readiness.poll_interval must be greater than zero")]
    ZeroPollInterval,
    #[error("readiness.progress_interval must be greater than zero")]
    ZeroProgressInterval,
    #[error("reaper.interval must be greater than zero")]
    ZeroReaperInterval,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push_with_hint(
        &mut self,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let streams = &config.streams;
    let mut warnings = ConfigWarnings::default();

    if streams.encode.segment_seconds == 0 {
        return Err(ConfigGuardRailError::ZeroSegmentSeconds);
    }
    if streams.encode.video.frame_rate == 0 {
        return Err(ConfigGuardRailError::ZeroFrameRate);
    }
    if streams.encode.audio.channels == 0 {
        return Err(ConfigGuardRailError::ZeroAudioChannels);
    }
    if streams.readiness.min_segments == 0 {
        return Err(ConfigGuardRailError::ZeroMinSegments);
    }
    if streams.readiness.poll_interval.is_zero() {
        return Err(ConfigGuardRailError::ZeroPollInterval);
    }
    if streams.readiness.progress_interval.is_zero() {
        return Err(ConfigGuardRailError::ZeroProgressInterval);
    }
    if streams.reaper.interval.is_zero() {
        return Err(ConfigGuardRailError::ZeroReaperInterval);
    }

    let prefix = streams.public_base_url.trim();
    if prefix.trim_end_matches('/').is_empty() {
        return Err(ConfigGuardRailError::EmptyPublicPrefix);
    }
    if !prefix.starts_with('/') {
        warnings.push_with_hint(
            format!("streams.public_prefix '{prefix}' is not an absolute path"),
            "Manifest URLs are built from this prefix; use something like /streams",
        );
    }

    let rolling_timeout = streams
        .readiness
        .rolling_timeout(streams.encode.segment_seconds);
    if streams.reaper.grace_period < rolling_timeout {
        warnings.push_with_hint(
            format!(
                "reaper.grace_period ({:?}) is shorter than the rolling readiness \
                 timeout ({:?})",
                streams.reaper.grace_period, rolling_timeout
            ),
            "A slow-starting session could be mistaken for an orphan",
        );
    }

    Ok(warnings)
}
