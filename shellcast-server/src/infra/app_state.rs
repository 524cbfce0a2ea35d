use std::{fmt, sync::Arc};

use shellcast_config::Config;
use shellcast_core::SessionRegistry;

use crate::media::path_resolver::MediaPathResolver;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub media: Arc<MediaPathResolver>,
    pub config: Arc<Config>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("sessions", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.stream_settings()));
        let media = Arc::new(MediaPathResolver::new(config.media_root()));
        Self {
            registry,
            media,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
