use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use shellcast_config::{ConfigGuardRailError, ConfigLoadError, ConfigLoader, EnvConfig};

fn env(vars: &[(&str, &str)]) -> EnvConfig {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    EnvConfig::from_lookup(|name| vars.get(name).cloned())
}

fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shellcast.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn defaults_apply_without_file_or_env() {
    let load = ConfigLoader::new().load_with_env(env(&[])).unwrap();
    let streams = load.config.stream_settings();

    assert_eq!(load.config.server.port, 3000);
    assert_eq!(streams.public_base_url, "/streams");
    assert_eq!(streams.encode.segment_seconds, 4);
    assert_eq!(streams.reaper.grace_period, Duration::from_secs(120));
    assert!(load.config.metadata.config_path.is_none());
    // Missing file is reported, not fatal
    assert!(!load.warnings.is_empty());
}

#[test]
fn file_values_override_defaults_and_env_overrides_file() {
    let (_dir, path) = write_config(
        r#"
[server]
port = 8080

[streams]
output_root = "/var/cache/shellcast"
public_prefix = "/hls"

[encode]
segment_seconds = 6
audio_channels = 6

[reaper]
grace_period = "5m"

[readiness]
poll_interval = "250ms"
"#,
    );

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(env(&[("SERVER_PORT", "9090"), ("HLS_SEGMENT_SECONDS", "2")]))
        .unwrap();
    let streams = load.config.stream_settings();

    assert_eq!(load.config.server.port, 9090);
    assert_eq!(streams.encode.segment_seconds, 2);
    assert_eq!(streams.encode.audio.channels, 6);
    assert_eq!(streams.output_root, PathBuf::from("/var/cache/shellcast"));
    assert_eq!(streams.public_base_url, "/hls");
    assert_eq!(streams.reaper.grace_period, Duration::from_secs(300));
    assert_eq!(streams.readiness.poll_interval, Duration::from_millis(250));
    assert_eq!(load.config.metadata.config_path.as_deref(), Some(path.as_path()));
}

#[test]
fn config_path_from_environment_is_honoured() {
    let (_dir, path) = write_config("[encode]\nrolling_list_size = 10\n");
    let load = ConfigLoader::new()
        .load_with_env(env(&[("SHELLCAST_CONFIG", path.to_str().unwrap())]))
        .unwrap();
    assert_eq!(load.config.streams.encode.rolling_list_size, 10);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConfigLoader::new()
        .with_config_path(dir.path().join("absent.toml"))
        .load_with_env(env(&[]))
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn malformed_toml_reports_parse_error() {
    let (_dir, path) = write_config("[encode\nsegment_seconds = ");
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(env(&[]))
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::Parse { .. }));
}

#[test]
fn bad_duration_names_the_key() {
    let err = ConfigLoader::new()
        .load_with_env(env(&[("REAPER_GRACE_PERIOD", "a while")]))
        .unwrap_err();
    match err {
        ConfigLoadError::InvalidDuration { key, value, .. } => {
            assert_eq!(key, "reaper.grace_period");
            assert_eq!(value, "a while");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn zero_segment_duration_is_rejected() {
    let err = ConfigLoader::new()
        .load_with_env(env(&[("HLS_SEGMENT_SECONDS", "0")]))
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::ZeroSegmentSeconds)
    ));
}

#[test]
fn zero_channels_and_min_segments_are_rejected() {
    let err = ConfigLoader::new()
        .load_with_env(env(&[("AUDIO_CHANNELS", "0")]))
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::ZeroAudioChannels)
    ));

    let err = ConfigLoader::new()
        .load_with_env(env(&[("READINESS_MIN_SEGMENTS", "0")]))
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::ZeroMinSegments)
    ));
}

#[test]
fn zero_intervals_are_rejected() {
    let cases = [
        ("READINESS_POLL_INTERVAL", "0", ConfigGuardRailError::ZeroPollInterval),
        ("READINESS_PROGRESS_INTERVAL", "0s", ConfigGuardRailError::ZeroProgressInterval),
        ("REAPER_INTERVAL", "0s", ConfigGuardRailError::ZeroReaperInterval),
    ];
    for (key, value, expected) in cases {
        let err = ConfigLoader::new()
            .load_with_env(env(&[(key, value)]))
            .unwrap_err();
        match err {
            ConfigLoadError::GuardRail(actual) => assert_eq!(actual, expected, "{key}"),
            other => panic!("{key}: unexpected error {other:?}"),
        }
    }
}

#[test]
fn manifest_byte_floor_reads_file_then_env() {
    let (_dir, path) = write_config("[readiness]\nmin_manifest_bytes = 256\n");

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(env(&[]))
        .unwrap();
    assert_eq!(load.config.stream_settings().readiness.min_manifest_bytes, 256);

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(env(&[("READINESS_MIN_MANIFEST_BYTES", " 512 ")]))
        .unwrap();
    assert_eq!(load.config.stream_settings().readiness.min_manifest_bytes, 512);
}

#[test]
fn empty_prefix_is_rejected_and_relative_prefix_warns() {
    let err = ConfigLoader::new()
        .load_with_env(env(&[("STREAMS_PUBLIC_PREFIX", "/")]))
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::EmptyPublicPrefix)
    ));

    let load = ConfigLoader::new()
        .load_with_env(env(&[("STREAMS_PUBLIC_PREFIX", "streams")]))
        .unwrap();
    assert!(
        load.warnings
            .items
            .iter()
            .any(|w| w.message.contains("not an absolute path"))
    );
}

#[test]
fn short_reaper_grace_warns() {
    let load = ConfigLoader::new()
        .load_with_env(env(&[("REAPER_GRACE_PERIOD", "5s")]))
        .unwrap();
    assert!(
        load.warnings
            .items
            .iter()
            .any(|w| w.message.contains("reaper.grace_period"))
    );
}

#[test]
fn ensure_directories_creates_output_root() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("cache/streams");
    let load = ConfigLoader::new()
        .load_with_env(env(&[("STREAMS_OUTPUT_ROOT", output.to_str().unwrap())]))
        .unwrap();

    load.config.ensure_directories().unwrap();
    assert!(output.is_dir());
}
