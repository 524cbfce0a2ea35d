use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use shellcast_config::{ConfigLoad, ConfigLoader};
use shellcast_core::{OrphanReaper, SessionIndex};
use shellcast_server::{AppState, create_app};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "shellcast-server")]
#[command(about = "Personal media streaming backend serving on-demand HLS transcodes")]
struct Cli {
    /// Path to shellcast.toml
    #[arg(long, env = "SHELLCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = cli.config {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    config
        .ensure_directories()
        .context("failed to prepare the stream output root")?;

    info!(
        media.root = %config.media_root().display(),
        streams.output_root = %config.output_root().display(),
        streams.public_prefix = %config.public_prefix(),
        encode.segment_seconds = config.stream_settings().encode.segment_seconds,
        "stream configuration in effect"
    );

    let config = Arc::new(config);
    let state = AppState::new(Arc::clone(&config));

    let reaper_cancel = CancellationToken::new();
    let index: Arc<dyn SessionIndex> = state.registry.clone();
    let reaper = OrphanReaper::new(
        config.output_root(),
        index,
        config.stream_settings().reaper.clone(),
    )
    .start(reaper_cancel.clone());

    let listener = tokio::net::TcpListener::bind((
        config.server.host.as_str(),
        config.server.port,
    ))
    .await
    .with_context(|| {
        format!(
            "failed to bind {}:{}",
            config.server.host, config.server.port
        )
    })?;
    info!(
        "Starting Shellcast server on {}:{}",
        config.server.host, config.server.port
    );

    axum::serve(listener, create_app(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down: stopping live sessions");
    state.registry.shutdown().await;
    reaper_cancel.cancel();
    if let Err(err) = reaper.await {
        warn!("orphan reaper task ended abnormally: {}", err);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", err);
        std::future::pending::<()>().await;
    }
}
