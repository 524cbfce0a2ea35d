pub mod error;

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use shellcast_core::StreamSettings;

use crate::{
    models::{
        Config, ConfigMetadata, MediaConfig, ServerConfig,
        sources::{EnvConfig, FileConfig},
    },
    util::parse_duration,
    validation::{self, ConfigWarnings},
};
use error::ConfigLoadError;

const DEFAULT_CONFIG_LOCATIONS: &[&str] =
    &["shellcast.toml", "config/shellcast.toml"];

/// A loaded configuration plus the non-fatal findings about it.
#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

/// Precedence, lowest first: built-in defaults, TOML file, environment.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Loads `.env` (when present), then composes from the process
    /// environment.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Composes from an explicit set of environment values; the process
    /// environment and `.env` are not consulted.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let config_present = file_config.is_some();

        let mut warnings = ConfigWarnings::default();
        if !config_present {
            warnings.push_with_hint(
                "No shellcast.toml detected; using defaults and environment variables",
                "Create shellcast.toml or pass --config to override stream settings",
            );
        }

        let config = compose_config(
            file_config.unwrap_or_default(),
            env,
            config_path,
        )?;
        warnings.extend(validation::apply_guard_rails(&config)?);

        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let (path, explicit) = match (&self.options.config_path, &env.config_path) {
            (Some(path), _) | (None, Some(path)) => (path.clone(), true),
            (None, None) => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => (path, false),
                None => return Ok((None, None)),
            },
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let file_config = read_file_config(&path)?;
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn duration(
    key: &'static str,
    env: Option<String>,
    file: Option<String>,
) -> Result<Option<Duration>, ConfigLoadError> {
    env.or(file)
        .map(|value| {
            parse_duration(&value).map_err(|source| {
                ConfigLoadError::InvalidDuration { key, value, source }
            })
        })
        .transpose()
}

fn compose_config(
    file: FileConfig,
    env: EnvConfig,
    config_path: Option<PathBuf>,
) -> Result<Config, ConfigLoadError> {
    let FileConfig {
        server: file_server,
        media: file_media,
        streams: file_streams,
        ffmpeg: file_ffmpeg,
        encode: file_encode,
        readiness: file_readiness,
        reaper: file_reaper,
        supervisor: file_supervisor,
        subtitles: file_subtitles,
    } = file;

    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        port: env.server_port.or(file_server.port).unwrap_or(3000),
    };

    let media = MediaConfig {
        root: env
            .media_root
            .or(file_media.root)
            .unwrap_or_else(|| PathBuf::from("./media")),
    };

    let mut streams = StreamSettings::default();

    if let Some(root) = env.streams_output_root.or(file_streams.output_root) {
        streams.output_root = root;
    }
    if let Some(prefix) = env.streams_public_prefix.or(file_streams.public_prefix) {
        streams.public_base_url = prefix;
    }
    if let Some(path) = env.ffmpeg_path.or(file_ffmpeg.ffmpeg_path) {
        streams.ffmpeg_path = path;
    }
    if let Some(path) = env.ffprobe_path.or(file_ffmpeg.ffprobe_path) {
        streams.ffprobe_path = path;
    }

    let encode = &mut streams.encode;
    if let Some(seconds) = env.segment_seconds.or(file_encode.segment_seconds) {
        encode.segment_seconds = seconds;
    }
    if let Some(size) = env.rolling_list_size.or(file_encode.rolling_list_size) {
        encode.rolling_list_size = size;
    }
    if let Some(rate) = env.frame_rate.or(file_encode.frame_rate) {
        encode.video.frame_rate = rate;
    }
    if let Some(kbps) = env.video_bitrate_kbps.or(file_encode.video_bitrate_kbps) {
        // VBV buffer follows the bitrate at 2x
        encode.video.bitrate_kbps = kbps;
        encode.video.buffer_kbps = kbps.saturating_mul(2);
    }
    if let Some(codec) = env.audio_codec.or(file_encode.audio_codec) {
        encode.audio.codec = codec;
    }
    if let Some(bitrate) = env.audio_bitrate.or(file_encode.audio_bitrate) {
        encode.audio.bitrate = bitrate;
    }
    if let Some(rate) = env.audio_sample_rate.or(file_encode.audio_sample_rate) {
        encode.audio.sample_rate = rate;
    }
    if let Some(channels) = env.audio_channels.or(file_encode.audio_channels) {
        encode.audio.channels = channels;
    }

    let readiness = &mut streams.readiness;
    if let Some(interval) = duration(
        "readiness.poll_interval",
        env.readiness_poll_interval,
        file_readiness.poll_interval,
    )? {
        readiness.poll_interval = interval;
    }
    if let Some(min) = env.readiness_min_segments.or(file_readiness.min_segments) {
        readiness.min_segments = min;
    }
    if let Some(bytes) = env
        .readiness_min_manifest_bytes
        .or(file_readiness.min_manifest_bytes)
    {
        readiness.min_manifest_bytes = bytes;
    }
    readiness.rolling_timeout = duration(
        "readiness.rolling_timeout",
        env.readiness_rolling_timeout,
        file_readiness.rolling_timeout,
    )?;
    if let Some(timeout) = duration(
        "readiness.complete_timeout",
        env.readiness_complete_timeout,
        file_readiness.complete_timeout,
    )? {
        readiness.complete_timeout = timeout;
    }
    if let Some(interval) = duration(
        "readiness.progress_interval",
        env.readiness_progress_interval,
        file_readiness.progress_interval,
    )? {
        readiness.progress_interval = interval;
    }

    if let Some(interval) =
        duration("reaper.interval", env.reaper_interval, file_reaper.interval)?
    {
        streams.reaper.interval = interval;
    }
    if let Some(grace) = duration(
        "reaper.grace_period",
        env.reaper_grace_period,
        file_reaper.grace_period,
    )? {
        streams.reaper.grace_period = grace;
    }

    if let Some(window) = duration(
        "supervisor.graceful_window",
        env.stop_graceful_window,
        file_supervisor.graceful_window,
    )? {
        streams.supervisor.graceful_window = window;
    }
    if let Some(window) = duration(
        "supervisor.forced_window",
        env.stop_forced_window,
        file_supervisor.forced_window,
    )? {
        streams.supervisor.forced_window = window;
    }

    if let Some(enabled) = env.subtitles_enabled.or(file_subtitles.enabled) {
        streams.subtitles.enabled = enabled;
    }
    if let Some(timeout) = duration(
        "subtitles.probe_timeout",
        env.subtitles_probe_timeout,
        file_subtitles.probe_timeout,
    )? {
        streams.subtitles.probe_timeout = timeout;
    }
    if let Some(timeout) = duration(
        "subtitles.extract_timeout",
        env.subtitles_extract_timeout,
        file_subtitles.extract_timeout,
    )? {
        streams.subtitles.extract_timeout = timeout;
    }

    Ok(Config {
        server,
        media,
        streams,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded: false,
        },
    })
}
