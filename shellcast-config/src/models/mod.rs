pub mod sources;

use std::path::{Path, PathBuf};

use shellcast_core::StreamSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub media: MediaConfig,
    /// Everything the session manager consumes, already in its own types
    pub streams: StreamSettings,
    pub metadata: ConfigMetadata,
}

impl Config {
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.streams.output_root)?;
        Ok(())
    }

    pub fn stream_settings(&self) -> &StreamSettings {
        &self.streams
    }

    pub fn media_root(&self) -> &Path {
        &self.media.root
    }

    pub fn output_root(&self) -> &Path {
        &self.streams.output_root
    }

    pub fn public_prefix(&self) -> &str {
        &self.streams.public_base_url
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Trusted root every requested filename is resolved against
    pub root: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
