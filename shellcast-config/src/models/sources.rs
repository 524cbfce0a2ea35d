use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::parse_bool;

/// Raw configuration as defined in a TOML file.
///
/// Durations are kept as strings here and parsed with `humantime` when the
/// loader composes the final [`Config`](crate::Config).
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub media: FileMediaConfig,
    #[serde(default)]
    pub streams: FileStreamsConfig,
    #[serde(default)]
    pub ffmpeg: FileFfmpegConfig,
    #[serde(default)]
    pub encode: FileEncodeConfig,
    #[serde(default)]
    pub readiness: FileReadinessConfig,
    #[serde(default)]
    pub reaper: FileReaperConfig,
    #[serde(default)]
    pub supervisor: FileSupervisorConfig,
    #[serde(default)]
    pub subtitles: FileSubtitlesConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileMediaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStreamsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_prefix: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileFfmpegConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffprobe_path: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileEncodeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolling_list_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_bitrate_kbps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_channels: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileReadinessConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_segments: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_manifest_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolling_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_interval: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileReaperConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileSupervisorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graceful_window: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced_window: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileSubtitlesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract_timeout: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub media_root: Option<PathBuf>,
    pub streams_output_root: Option<PathBuf>,
    pub streams_public_prefix: Option<String>,
    pub ffmpeg_path: Option<String>,
    pub ffprobe_path: Option<String>,
    pub segment_seconds: Option<u32>,
    pub rolling_list_size: Option<u32>,
    pub frame_rate: Option<u32>,
    pub video_bitrate_kbps: Option<u32>,
    pub audio_codec: Option<String>,
    pub audio_bitrate: Option<String>,
    pub audio_sample_rate: Option<u32>,
    pub audio_channels: Option<u32>,
    pub readiness_poll_interval: Option<String>,
    pub readiness_min_segments: Option<usize>,
    pub readiness_min_manifest_bytes: Option<u64>,
    pub readiness_rolling_timeout: Option<String>,
    pub readiness_complete_timeout: Option<String>,
    pub readiness_progress_interval: Option<String>,
    pub reaper_interval: Option<String>,
    pub reaper_grace_period: Option<String>,
    pub stop_graceful_window: Option<String>,
    pub stop_forced_window: Option<String>,
    pub subtitles_enabled: Option<bool>,
    pub subtitles_probe_timeout: Option<String>,
    pub subtitles_extract_timeout: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; `gather` uses the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        let var = |name: &str| non_blank(lookup, name);
        let trimmed = |name: &str| non_blank(lookup, name).map(|s| s.trim().to_string());

        Self {
            config_path: var("SHELLCAST_CONFIG").map(PathBuf::from),
            server_host: var("SERVER_HOST"),
            server_port: var("SERVER_PORT").and_then(|s| s.parse().ok()),
            media_root: var("MEDIA_ROOT").map(PathBuf::from),
            streams_output_root: var("STREAMS_OUTPUT_ROOT").map(PathBuf::from),
            streams_public_prefix: var("STREAMS_PUBLIC_PREFIX"),
            ffmpeg_path: var("FFMPEG_PATH"),
            ffprobe_path: var("FFPROBE_PATH"),
            segment_seconds: trimmed("HLS_SEGMENT_SECONDS").and_then(|s| s.parse().ok()),
            rolling_list_size: trimmed("HLS_LIST_SIZE").and_then(|s| s.parse().ok()),
            frame_rate: trimmed("ENCODE_FRAME_RATE").and_then(|s| s.parse().ok()),
            video_bitrate_kbps: trimmed("VIDEO_BITRATE_KBPS").and_then(|s| s.parse().ok()),
            audio_codec: var("AUDIO_CODEC"),
            audio_bitrate: var("AUDIO_BITRATE"),
            audio_sample_rate: trimmed("AUDIO_SAMPLE_RATE").and_then(|s| s.parse().ok()),
            audio_channels: trimmed("AUDIO_CHANNELS").and_then(|s| s.parse().ok()),
            readiness_poll_interval: var("READINESS_POLL_INTERVAL"),
            readiness_min_segments: trimmed("READINESS_MIN_SEGMENTS").and_then(|s| s.parse().ok()),
            readiness_min_manifest_bytes: trimmed("READINESS_MIN_MANIFEST_BYTES")
                .and_then(|s| s.parse().ok()),
            readiness_rolling_timeout: var("READINESS_ROLLING_TIMEOUT"),
            readiness_complete_timeout: var("READINESS_COMPLETE_TIMEOUT"),
            readiness_progress_interval: var("READINESS_PROGRESS_INTERVAL"),
            reaper_interval: var("REAPER_INTERVAL"),
            reaper_grace_period: var("REAPER_GRACE_PERIOD"),
            stop_graceful_window: var("STOP_GRACEFUL_WINDOW"),
            stop_forced_window: var("STOP_FORCED_WINDOW"),
            subtitles_enabled: var("SUBTITLES_ENABLED").and_then(|s| parse_bool(&s)),
            subtitles_probe_timeout: var("SUBTITLES_PROBE_TIMEOUT"),
            subtitles_extract_timeout: var("SUBTITLES_EXTRACT_TIMEOUT"),
        }
    }
}

fn non_blank(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.trim().is_empty())
}
