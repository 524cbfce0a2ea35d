use std::fmt;
use std::path::{Path, PathBuf};

use crate::session::{OutputPolicy, Session, StreamMode};
use crate::settings::EncodeSettings;

/// A fully composed external invocation. Pure data; nothing is spawned here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl EncodeCommand {
    fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    fn path_arg(&mut self, path: &Path) -> &mut Self {
        self.arg(path.to_string_lossy())
    }

    fn in_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    /// Value following the first occurrence of `flag`
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }
}

impl fmt::Display for EncodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Maps a session onto the encoder's HLS invocation.
#[derive(Debug, Clone)]
pub struct EncodeCommandBuilder {
    ffmpeg_path: String,
    encode: EncodeSettings,
}

impl EncodeCommandBuilder {
    pub fn new(ffmpeg_path: impl Into<String>, encode: EncodeSettings) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            encode,
        }
    }

    pub fn build(&self, session: &Session) -> EncodeCommand {
        let encode = &self.encode;
        let mut cmd = EncodeCommand::new(&self.ffmpeg_path);

        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg(&encode.log_level);

        // Rolling output paces reads at native rate so the playlist tracks
        // wall-clock time; VOD encodes as fast as the host allows.
        if session.policy() == OutputPolicy::Rolling {
            cmd.arg("-re");
        }

        cmd.arg("-i").path_arg(session.source());

        match session.mode() {
            StreamMode::Video => {
                cmd.arg("-map").arg("0:v:0");
                cmd.arg("-map").arg("0:a:0");
                self.video_args(&mut cmd);
            }
            StreamMode::AudioOnly => {
                cmd.arg("-vn");
                cmd.arg("-map").arg("0:a:0");
            }
        }

        self.audio_args(&mut cmd);
        self.hls_args(&mut cmd, session);

        cmd.in_dir(session.output_dir())
    }

    fn video_args(&self, cmd: &mut EncodeCommand) {
        let video = &self.encode.video;
        let keyint = self.encode.keyframe_interval().to_string();

        cmd.arg("-c:v").arg(&video.codec);
        cmd.arg("-profile:v").arg(&video.profile);
        cmd.arg("-level").arg(&video.level);
        cmd.arg("-pix_fmt").arg(&video.pixel_format);
        cmd.arg("-r").arg(video.frame_rate.to_string());

        // Fixed GOP with scene-cut disabled: every segment opens on a keyframe
        cmd.arg("-g").arg(&keyint);
        cmd.arg("-keyint_min").arg(&keyint);
        cmd.arg("-sc_threshold").arg("0");

        if video.codec == "libx264" {
            cmd.arg("-x264-params").arg(format!(
                "repeat-headers=1:vbv-maxrate={}:vbv-bufsize={}",
                video.bitrate_kbps, video.buffer_kbps
            ));
        } else {
            cmd.arg("-maxrate").arg(format!("{}k", video.bitrate_kbps));
            cmd.arg("-bufsize").arg(format!("{}k", video.buffer_kbps));
        }
        cmd.arg("-b:v").arg(format!("{}k", video.bitrate_kbps));
    }

    fn audio_args(&self, cmd: &mut EncodeCommand) {
        let audio = &self.encode.audio;
        cmd.arg("-c:a").arg(&audio.codec);
        cmd.arg("-b:a").arg(&audio.bitrate);
        cmd.arg("-ar").arg(audio.sample_rate.to_string());
        cmd.arg("-ac").arg(audio.channels.to_string());
    }

    fn hls_args(&self, cmd: &mut EncodeCommand, session: &Session) {
        cmd.arg("-f").arg("hls");
        cmd.arg("-hls_time").arg(self.encode.segment_seconds.to_string());

        match session.policy() {
            OutputPolicy::Rolling => {
                cmd.arg("-hls_list_size")
                    .arg(self.encode.rolling_list_size.to_string());
                cmd.arg("-hls_flags")
                    .arg("independent_segments+delete_segments");
            }
            OutputPolicy::Complete => {
                cmd.arg("-hls_list_size").arg("0");
                cmd.arg("-hls_playlist_type").arg("vod");
                cmd.arg("-hls_flags").arg("independent_segments");
            }
        }

        cmd.arg("-start_number").arg("1");
        cmd.arg("-hls_segment_filename")
            .path_arg(&session.segment_pattern());
        cmd.path_arg(&session.manifest_path());
    }
}

/// Lists subtitle streams with their codec and tags as JSON.
pub fn subtitle_probe_command(ffprobe_path: &str, source: &Path) -> EncodeCommand {
    let mut cmd = EncodeCommand::new(ffprobe_path);
    cmd.arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("s")
        .arg("-show_entries")
        .arg("stream=index,codec_name:stream_tags=language,title")
        .arg("-of")
        .arg("json")
        .path_arg(source);
    cmd
}

/// Converts one subtitle stream to WebVTT. `ordinal` is the stream's position
/// among subtitle streams (`0:s:N`), not its absolute container index.
pub fn subtitle_extract_command(
    ffmpeg_path: &str,
    source: &Path,
    ordinal: usize,
    output: &Path,
) -> EncodeCommand {
    let mut cmd = EncodeCommand::new(ffmpeg_path);
    cmd.arg("-y")
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .path_arg(source)
        .arg("-map")
        .arg(format!("0:s:{ordinal}"))
        .arg("-c:s")
        .arg("webvtt")
        .path_arg(output);
    match output.parent() {
        Some(dir) => cmd.in_dir(dir),
        None => cmd,
    }
}
