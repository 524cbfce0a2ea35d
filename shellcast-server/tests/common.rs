use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use axum_test::TestServer;
use shellcast_config::{Config, ConfigMetadata, MediaConfig, ServerConfig};
use shellcast_core::{
    ReadinessSettings, StreamSettings, SubtitleSettings, SupervisorSettings,
};
use shellcast_server::{AppState, create_app};
use tempfile::TempDir;

pub const PLAYLIST: &str = concat!(
    "#EXTM3U\\n#EXT-X-VERSION:3\\n#EXT-X-TARGETDURATION:4\\n",
    "#EXTINF:4.000000,\\nseg-00000001.ts\\n",
    "#EXTINF:4.000000,\\nseg-00000002.ts\\n",
);

// Code is used by test modules, but not in this scope
#[allow(unused)]
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub media_root: PathBuf,
    pub output_root: PathBuf,
    _tempdir: TempDir,
}

#[allow(unused)]
impl TestApp {
    pub fn session_dirs(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.output_root)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect()
    }
}

/// App whose ffmpeg is a shell script writing a playable rolling playlist
/// and then idling like a live encode.
#[allow(unused)]
pub fn build_test_app() -> TestApp {
    let tempdir = tempfile::tempdir().unwrap();
    let bin = tempdir.path().join("bin");
    let media_root = tempdir.path().join("media");
    let output_root = tempdir.path().join("streams");
    for dir in [&bin, &media_root, &output_root] {
        std::fs::create_dir_all(dir).unwrap();
    }
    std::fs::write(media_root.join("film.mkv"), b"not really a movie").unwrap();
    std::fs::write(tempdir.path().join("secret.txt"), b"outside the root").unwrap();

    let ffmpeg = bin.join("ffmpeg");
    write_script(
        &ffmpeg,
        &format!(
            "#!/bin/sh\nfor a; do out=\"$a\"; done\nprintf '{PLAYLIST}' > \"$out\"\nexec sleep 30\n"
        ),
    );

    let streams = StreamSettings {
        output_root: output_root.clone(),
        public_base_url: "/streams".to_string(),
        ffmpeg_path: ffmpeg.display().to_string(),
        ffprobe_path: bin.join("ffprobe").display().to_string(),
        readiness: ReadinessSettings {
            poll_interval: Duration::from_millis(20),
            rolling_timeout: Some(Duration::from_secs(5)),
            complete_timeout: Duration::from_secs(5),
            ..Default::default()
        },
        supervisor: SupervisorSettings {
            graceful_window: Duration::from_millis(500),
            forced_window: Duration::from_millis(500),
        },
        subtitles: SubtitleSettings {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };

    let config = Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        media: MediaConfig {
            root: media_root.clone(),
        },
        streams,
        metadata: ConfigMetadata::default(),
    };

    let state = AppState::new(Arc::new(config));
    let server = TestServer::new(create_app(state.clone())).unwrap();

    TestApp {
        server,
        state,
        media_root,
        output_root,
        _tempdir: tempdir,
    }
}

#[cfg(unix)]
fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .unwrap();
}

#[cfg(not(unix))]
fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
}
