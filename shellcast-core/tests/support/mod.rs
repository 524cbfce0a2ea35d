//! Shared fixtures: shell scripts standing in for ffmpeg and ffprobe, and a
//! scratch media/output tree per test.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use shellcast_core::{
    ReadinessSettings, StreamSettings, SubtitleSettings, SupervisorSettings,
};
use tempfile::TempDir;

/// Two segments: enough for a rolling playlist to count as playable.
pub const TWO_SEGMENTS: &str = concat!(
    "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:1\n",
    "#EXTINF:4.000000,\nseg-00000001.ts\n",
    "#EXTINF:4.000000,\nseg-00000002.ts\n",
);

pub const ONE_SEGMENT: &str = concat!(
    "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:1\n",
    "#EXTINF:4.000000,\nseg-00000001.ts\n",
);

/// How the fake encoder behaves once it has parsed its arguments.
/// `$out` holds the manifest path.
pub mod encoder {
    /// Writes a playable rolling playlist and keeps running like a live encode
    pub fn rolling_ready() -> String {
        format!(
            "echo 'fake encoder starting' >&2\nprintf '{}' > \"$out\"\nexec sleep 30\n",
            super::TWO_SEGMENTS.replace('\n', "\\n")
        )
    }

    pub fn stuck_after_one_segment() -> String {
        format!(
            "printf '{}' > \"$out\"\nexec sleep 30\n",
            super::ONE_SEGMENT.replace('\n', "\\n")
        )
    }

    pub fn silent() -> String {
        "exec sleep 30\n".to_string()
    }

    pub fn exits_with(code: i32) -> String {
        format!("echo 'decode error' >&2\nexit {code}\n")
    }

    pub fn finishes_vod() -> String {
        format!(
            "printf '{}#EXT-X-ENDLIST\\n' > \"$out\"\nexit 0\n",
            super::TWO_SEGMENTS.replace('\n', "\\n")
        )
    }

    pub fn finishes_without_end_marker() -> String {
        format!(
            "printf '{}' > \"$out\"\nexit 0\n",
            super::TWO_SEGMENTS.replace('\n', "\\n")
        )
    }
}

pub struct Fixture {
    pub root: TempDir,
    pub source: PathBuf,
    pub output_root: PathBuf,
    pub settings: StreamSettings,
}

impl Fixture {
    /// Fake ffmpeg running `encoder_body` for HLS invocations; subtitle
    /// extractions write a WebVTT file naming the `-map` they were given.
    pub fn new(encoder_body: &str) -> Self {
        let root = tempfile::tempdir().unwrap();
        let bin = root.path().join("bin");
        let media = root.path().join("media");
        let output_root = root.path().join("streams");
        fs::create_dir_all(&bin).unwrap();
        fs::create_dir_all(&media).unwrap();
        fs::create_dir_all(&output_root).unwrap();

        let source = media.join("film.mkv");
        fs::write(&source, b"not really a movie").unwrap();

        let ffmpeg = write_script(&bin.join("ffmpeg"), &fake_ffmpeg(encoder_body));
        let ffprobe = write_script(&bin.join("ffprobe"), &fake_ffprobe(NO_SUBTITLES));

        let settings = StreamSettings {
            output_root: output_root.clone(),
            public_base_url: "/streams".to_string(),
            ffmpeg_path: ffmpeg.display().to_string(),
            ffprobe_path: ffprobe.display().to_string(),
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
                probe_timeout: Duration::from_secs(2),
                extract_timeout: Duration::from_secs(2),
                ..Default::default()
            },
            ..Default::default()
        };

        Self {
            root,
            source,
            output_root,
            settings,
        }
    }

    /// Replaces the fake ffprobe with one printing `json`.
    pub fn with_probe_output(self, json: &str) -> Self {
        write_script(Path::new(&self.settings.ffprobe_path), &fake_ffprobe(json));
        self
    }

    pub fn with_failing_probe(self) -> Self {
        write_script(
            Path::new(&self.settings.ffprobe_path),
            "#!/bin/sh\necho 'probe failed' >&2\nexit 1\n",
        );
        self
    }

    /// Extracting the `ordinal`-th subtitle stream exits non-zero without
    /// writing anything.
    pub fn with_failing_extraction(self, ordinal: usize) -> Self {
        self.mark_extraction(ordinal, "fail")
    }

    /// Extracting the `ordinal`-th subtitle stream never finishes.
    pub fn with_hanging_extraction(self, ordinal: usize) -> Self {
        self.mark_extraction(ordinal, "hang")
    }

    fn mark_extraction(self, ordinal: usize, behaviour: &str) -> Self {
        let marker = format!("{}.0_s_{ordinal}.{behaviour}", self.settings.ffmpeg_path);
        fs::write(marker, b"").unwrap();
        self
    }

    /// Session directories currently present under the output root
    pub fn session_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.output_root)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        dirs
    }
}

const NO_SUBTITLES: &str = r#"{"programs": [], "streams": []}"#;

fn fake_ffmpeg(encoder_body: &str) -> String {
    format!(
        r#"#!/bin/sh
out=""
map=""
prev=""
for a; do
  if [ "$prev" = "-map" ]; then map="$a"; fi
  prev="$a"
  out="$a"
done
case "$*" in
  *webvtt*)
    marker="$0.$(echo "$map" | tr ':' '_')"
    if [ -e "$marker.fail" ]; then echo 'extraction failed' >&2; exit 1; fi
    if [ -e "$marker.hang" ]; then exec sleep 30; fi
    printf 'WEBVTT\n\n00:00.000 --> 00:01.000\n%s\n' "$map" > "$out"
    exit 0
    ;;
esac
{encoder_body}"#
    )
}

fn fake_ffprobe(json: &str) -> String {
    format!("#!/bin/sh\ncat <<'EOF'\n{json}\nEOF\n")
}

fn write_script(path: &Path, body: &str) -> PathBuf {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// Polls `check` every 20ms until it holds or `limit` elapses.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
