use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the session manager.
///
/// Built by `shellcast-config` from file and environment sources; the core
/// never reads the environment itself.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Directory holding one subdirectory per session
    pub output_root: PathBuf,
    /// URL prefix that mirrors `output_root` (e.g. `/streams`)
    pub public_base_url: String,
    /// FFmpeg binary path
    pub ffmpeg_path: String,
    /// FFprobe binary path
    pub ffprobe_path: String,
    pub encode: EncodeSettings,
    pub readiness: ReadinessSettings,
    pub supervisor: SupervisorSettings,
    pub reaper: ReaperSettings,
    pub subtitles: SubtitleSettings,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("./cache/streams"),
            public_base_url: "/streams".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            encode: EncodeSettings::default(),
            readiness: ReadinessSettings::default(),
            supervisor: SupervisorSettings::default(),
            reaper: ReaperSettings::default(),
            subtitles: SubtitleSettings::default(),
        }
    }
}

/// Encoder tunables. Constant for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    /// Target HLS segment duration in seconds
    pub segment_seconds: u32,
    /// Number of segments kept in a rolling playlist
    pub rolling_list_size: u32,
    /// Value passed to `-loglevel`
    pub log_level: String,
    pub video: VideoSettings,
    pub audio: AudioSettings,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            segment_seconds: 4,
            rolling_list_size: 24,
            log_level: "info".to_string(),
            video: VideoSettings::default(),
            audio: AudioSettings::default(),
        }
    }
}

impl EncodeSettings {
    /// Frames between forced keyframes, so every segment opens on one.
    pub fn keyframe_interval(&self) -> u32 {
        self.segment_seconds * self.video.frame_rate
    }
}

#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub codec: String,
    pub profile: String,
    pub level: String,
    pub pixel_format: String,
    pub frame_rate: u32,
    pub bitrate_kbps: u32,
    /// VBV buffer size; twice the bitrate by default
    pub buffer_kbps: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            profile: "main".to_string(),
            level: "3.1".to_string(),
            pixel_format: "yuv420p".to_string(),
            frame_rate: 30,
            bitrate_kbps: 2500,
            buffer_kbps: 5000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioSettings {
    pub codec: String,
    pub bitrate: String,
    pub sample_rate: u32,
    pub channels: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            codec: "aac".to_string(),
            bitrate: "128k".to_string(),
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadinessSettings {
    /// Manifest polling interval for rolling output
    pub poll_interval: Duration,
    /// `#EXTINF` entries required before a rolling manifest is playable
    pub min_segments: usize,
    /// A manifest at or below this size is treated as unwritten
    pub min_manifest_bytes: u64,
    /// Overrides the derived rolling timeout when set
    pub rolling_timeout: Option<Duration>,
    /// Upper bound for a complete (VOD) encode
    pub complete_timeout: Duration,
    /// How often a pending wait logs that it is still waiting
    pub progress_interval: Duration,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(150),
            min_segments: 2,
            min_manifest_bytes: 64,
            rolling_timeout: None,
            complete_timeout: Duration::from_secs(3600), // 1 hour
            progress_interval: Duration::from_secs(30),
        }
    }
}

impl ReadinessSettings {
    /// Rolling timeout: enough time for `min_segments` segments plus 8s of
    /// encoder warm-up, unless overridden.
    pub fn rolling_timeout(&self, segment_seconds: u32) -> Duration {
        self.rolling_timeout.unwrap_or_else(|| {
            Duration::from_secs(
                u64::from(segment_seconds) * self.min_segments as u64 + 8,
            )
        })
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Wait after SIGTERM before escalating
    pub graceful_window: Duration,
    /// Wait after the forced kill before giving up
    pub forced_window: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            graceful_window: Duration::from_secs(3),
            forced_window: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReaperSettings {
    pub interval: Duration,
    /// Minimum age before an untracked directory may be deleted
    pub grace_period: Duration,
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            grace_period: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubtitleSettings {
    pub enabled: bool,
    pub probe_timeout: Duration,
    pub extract_timeout: Duration,
}

impl Default for SubtitleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            probe_timeout: Duration::from_secs(10),
            extract_timeout: Duration::from_secs(120),
        }
    }
}
