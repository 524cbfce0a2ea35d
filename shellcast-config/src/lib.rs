//! Configuration library for Shellcast.
//!
//! Loads server and stream settings from built-in defaults, an optional TOML
//! file and the environment (with `.env` support), then applies guard rails.
//! The resulting [`Config`] hands the session manager its
//! [`StreamSettings`](shellcast_core::StreamSettings) directly.

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{Config, ConfigMetadata, MediaConfig, ServerConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
