//! Best-effort sidecar subtitle extraction.
//!
//! Runs detached from session creation. Every failure ends here as a log
//! line; the only observable product is `subs.json` (plus its `.vtt` files),
//! and its absence means "no subtitles".

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{EncodeCommand, subtitle_extract_command, subtitle_probe_command};
use crate::session::Session;
use crate::settings::SubtitleSettings;

/// Codecs that convert to WebVTT. Bitmap formats (PGS, VobSub, DVB) do not.
pub const TEXT_CODECS: &[&str] = &["subrip", "ass", "ssa", "webvtt", "mov_text", "text"];

const UNDETERMINED_LANGUAGE: &str = "und";

#[derive(Debug, Error)]
pub enum SubtitleError {
    #[error("{step} timed out after {limit:?}")]
    Timeout { step: &'static str, limit: Duration },

    #[error("{step} failed: {detail}")]
    Failed { step: &'static str, detail: String },

    #[error("unreadable probe output: {0}")]
    Probe(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: u32,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    tags: ProbeTags,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// One text subtitle stream found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleStream {
    /// Absolute stream index in the container, as ffprobe reports it
    pub index: u32,
    /// Position among subtitle streams only, as ffmpeg's `0:s:N` expects
    pub ordinal: usize,
    pub codec: String,
    /// Language tag as present in the container
    pub language: Option<String>,
    pub title: Option<String>,
}

impl SubtitleStream {
    /// Lowercased language code, `und` when absent or unusable in a file name
    pub fn lang(&self) -> String {
        self.language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty() && l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| UNDETERMINED_LANGUAGE.to_string())
    }

    pub fn label(&self) -> String {
        let non_blank = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        non_blank(&self.title)
            .or_else(|| non_blank(&self.language))
            .unwrap_or_else(|| format!("Sub #{}", self.index))
    }

    pub fn file_name(&self) -> String {
        format!("subs-{:02}-{}.vtt", self.index, self.lang())
    }
}

/// Entry of `subs.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub label: String,
    pub lang: String,
    pub src: String,
}

/// Reads ffprobe's JSON and keeps the text streams. Ordinals are assigned
/// over every probed subtitle stream before filtering, so they stay aligned
/// with ffmpeg's numbering even when bitmap streams sit in between.
pub fn parse_probe(json: &str) -> Result<Vec<SubtitleStream>, SubtitleError> {
    let output: ProbeOutput = serde_json::from_str(json)?;

    Ok(output
        .streams
        .into_iter()
        .enumerate()
        .filter_map(|(ordinal, stream)| {
            let codec = stream.codec_name?.to_ascii_lowercase();
            TEXT_CODECS.contains(&codec.as_str()).then(|| SubtitleStream {
                index: stream.index,
                ordinal,
                codec,
                language: stream.tags.language,
                title: stream.tags.title,
            })
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct SubtitleExtractor {
    ffmpeg_path: String,
    ffprobe_path: String,
    settings: SubtitleSettings,
}

impl SubtitleExtractor {
    pub fn new(
        ffmpeg_path: impl Into<String>,
        ffprobe_path: impl Into<String>,
        settings: SubtitleSettings,
    ) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            settings,
        }
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Fire-and-forget extraction for `session`. Cancelling the token kills
    /// any running probe or extraction.
    pub fn spawn(&self, session: Session, cancel: CancellationToken) -> JoinHandle<()> {
        let extractor = self.clone();
        tokio::spawn(async move {
            let session_id = session.id();
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(%session_id, "subtitle extraction cancelled");
                }
                result = extractor.extract_all(&session) => match result {
                    Ok(tracks) if tracks.is_empty() => {
                        debug!(%session_id, "no text subtitles extracted");
                    }
                    Ok(tracks) => {
                        info!(%session_id, tracks = tracks.len(), "subtitles extracted");
                    }
                    Err(e) => {
                        warn!(%session_id, "subtitle extraction skipped: {}", e);
                    }
                },
            }
        })
    }

    /// Probes, extracts each text track and writes the manifest when at
    /// least one track succeeded. Returns the tracks listed in it.
    pub async fn extract_all(
        &self,
        session: &Session,
    ) -> Result<Vec<SubtitleTrack>, SubtitleError> {
        let streams = self.probe(session.source()).await?;
        if streams.is_empty() {
            return Ok(Vec::new());
        }

        let mut tracks = Vec::with_capacity(streams.len());
        for stream in &streams {
            match self.extract(session, stream).await {
                Ok(()) => tracks.push(SubtitleTrack {
                    label: stream.label(),
                    lang: stream.lang(),
                    src: session.url_for(&stream.file_name()),
                }),
                Err(e) => warn!(
                    session_id = %session.id(),
                    index = stream.index,
                    "subtitle track failed: {}", e
                ),
            }
        }

        if !tracks.is_empty() {
            write_manifest(&session.subtitles_manifest_path(), &tracks).await?;
        }
        Ok(tracks)
    }

    async fn probe(&self, source: &Path) -> Result<Vec<SubtitleStream>, SubtitleError> {
        let cmd = subtitle_probe_command(&self.ffprobe_path, source);
        let output = run_bounded(
            &cmd,
            Stdio::piped(),
            Stdio::null(),
            "probe",
            self.settings.probe_timeout,
        )
        .await?;
        if !output.status.success() {
            return Err(SubtitleError::Failed {
                step: "probe",
                detail: output.status.to_string(),
            });
        }
        parse_probe(&String::from_utf8_lossy(&output.stdout))
    }

    async fn extract(
        &self,
        session: &Session,
        stream: &SubtitleStream,
    ) -> Result<(), SubtitleError> {
        let output_file = session.output_dir().join(stream.file_name());
        let err_log = session
            .output_dir()
            .join(format!("subs-{}.err", stream.index));
        let stderr = tokio::fs::File::create(&err_log).await?.into_std().await;

        let cmd = subtitle_extract_command(
            &self.ffmpeg_path,
            session.source(),
            stream.ordinal,
            &output_file,
        );
        let output = run_bounded(
            &cmd,
            Stdio::null(),
            Stdio::from(stderr),
            "extraction",
            self.settings.extract_timeout,
        )
        .await?;

        let written = tokio::fs::metadata(&output_file)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if output.status.success() && written {
            Ok(())
        } else {
            Err(SubtitleError::Failed {
                step: "extraction",
                detail: format!("{}, see {}", output.status, err_log.display()),
            })
        }
    }
}

/// Runs a short-lived helper. The child is killed if the limit elapses or
/// the calling future is dropped.
async fn run_bounded(
    cmd: &EncodeCommand,
    stdout: Stdio,
    stderr: Stdio,
    step: &'static str,
    limit: Duration,
) -> Result<Output, SubtitleError> {
    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true);
    if let Some(dir) = &cmd.working_dir {
        command.current_dir(dir);
    }

    let child = command.spawn()?;
    timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| SubtitleError::Timeout { step, limit })?
        .map_err(SubtitleError::from)
}

/// Temp file then rename, so readers never observe a partial manifest.
async fn write_manifest(path: &Path, tracks: &[SubtitleTrack]) -> Result<(), SubtitleError> {
    let json = serde_json::to_vec_pretty(tracks)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
