use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Manifest file name inside every session directory
pub const MANIFEST_FILE: &str = "index.m3u8";
/// Sidecar subtitle manifest, absent when no track was extracted
pub const SUBTITLES_MANIFEST_FILE: &str = "subs.json";
/// Segment naming pattern handed to the encoder (start index 1)
pub const SEGMENT_PATTERN: &str = "seg-%08d.ts";
pub const ENCODER_STDOUT: &str = "encoder.out";
pub const ENCODER_STDERR: &str = "encoder.err";

/// Opaque session identifier. Generated per session and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identity of the user a session belongs to. Authenticated upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Owner(String);

impl Owner {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the encoder produces for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// First video and first audio stream, plus sidecar subtitles
    Video,
    /// First audio stream only
    #[serde(alias = "audio", alias = "music")]
    AudioOnly,
}

impl StreamMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::AudioOnly => "audio",
        }
    }

    pub fn carries_subtitles(&self) -> bool {
        matches!(self, Self::Video)
    }
}

/// How the playlist is written, chosen by the caller's intended use.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputPolicy {
    /// Bounded playlist, old segments deleted as new ones arrive
    #[default]
    Rolling,
    /// Untrimmed playlist finalized with `#EXT-X-ENDLIST`
    #[serde(alias = "vod")]
    Complete,
}

impl OutputPolicy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rolling => "rolling",
            Self::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Ready,
    Stopping,
}

/// Everything needed to start a session. `source` must already be resolved
/// against the trusted media root.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub owner: Owner,
    pub mode: StreamMode,
    pub policy: OutputPolicy,
    pub source: PathBuf,
}

impl StreamRequest {
    pub fn new(
        owner: impl Into<String>,
        mode: StreamMode,
        source: impl Into<PathBuf>,
    ) -> Self {
        Self {
            owner: Owner::new(owner),
            mode,
            policy: OutputPolicy::default(),
            source: source.into(),
        }
    }

    pub fn with_policy(mut self, policy: OutputPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// The path/URL rule. A session directory and its public URL are both a pure
/// function of the session id; nothing else may influence either.
#[derive(Debug, Clone)]
pub struct StreamLayout {
    output_root: PathBuf,
    public_base_url: String,
}

impl StreamLayout {
    pub fn new(
        output_root: impl Into<PathBuf>,
        public_base_url: impl AsRef<str>,
    ) -> Self {
        Self {
            output_root: output_root.into(),
            public_base_url: public_base_url
                .as_ref()
                .trim_end_matches('/')
                .to_string(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Prefix without a trailing slash
    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    pub fn dir_for(&self, id: &SessionId) -> PathBuf {
        self.output_root.join(id.to_string())
    }

    /// Public directory URL, always ending in `/`
    pub fn dir_url_for(&self, id: &SessionId) -> String {
        format!("{}/{}/", self.public_base_url, id)
    }

    /// Maps a public URL back onto the filesystem. Returns `None` for URLs
    /// outside the prefix or paths that would escape the output root.
    pub fn resolve_url(&self, url: &str) -> Option<PathBuf> {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let rest = path.strip_prefix(&self.public_base_url)?;
        let rest = rest.strip_prefix('/')?;

        let mut resolved = self.output_root.clone();
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(part)), None) => resolved.push(part),
                _ => return None,
            }
        }
        Some(resolved)
    }
}

/// One streaming instance: one encoder process and one output directory.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    owner: Owner,
    mode: StreamMode,
    policy: OutputPolicy,
    source: PathBuf,
    output_dir: PathBuf,
    public_dir_url: String,
    created_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(request: &StreamRequest, layout: &StreamLayout) -> Self {
        let id = SessionId::new();
        Self {
            id,
            owner: request.owner.clone(),
            mode: request.mode,
            policy: request.policy,
            source: request.source.clone(),
            output_dir: layout.dir_for(&id),
            public_dir_url: layout.dir_url_for(&id),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn policy(&self) -> OutputPolicy {
        self.policy
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn public_dir_url(&self) -> &str {
        &self.public_dir_url
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(MANIFEST_FILE)
    }

    pub fn manifest_url(&self) -> String {
        self.url_for(MANIFEST_FILE)
    }

    pub fn subtitles_manifest_path(&self) -> PathBuf {
        self.output_dir.join(SUBTITLES_MANIFEST_FILE)
    }

    pub fn subtitles_url(&self) -> String {
        self.url_for(SUBTITLES_MANIFEST_FILE)
    }

    pub fn segment_pattern(&self) -> PathBuf {
        self.output_dir.join(SEGMENT_PATTERN)
    }

    pub fn stdout_log(&self) -> PathBuf {
        self.output_dir.join(ENCODER_STDOUT)
    }

    pub fn stderr_log(&self) -> PathBuf {
        self.output_dir.join(ENCODER_STDERR)
    }

    /// Public URL of a file inside the session directory
    pub fn url_for(&self, file_name: &str) -> String {
        format!("{}{}", self.public_dir_url, file_name)
    }

    pub fn info(&self, state: SessionState) -> SessionInfo {
        SessionInfo {
            id: self.id,
            owner: self.owner.clone(),
            mode: self.mode,
            policy: self.policy,
            state,
            manifest_url: self.manifest_url(),
            subtitles_url: self
                .mode
                .carries_subtitles()
                .then(|| self.subtitles_url()),
            created_at: self.created_at,
        }
    }
}

/// Externally visible snapshot of a tracked session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: SessionId,
    pub owner: Owner,
    pub mode: StreamMode,
    pub policy: OutputPolicy,
    pub state: SessionState,
    pub manifest_url: String,
    /// Absence of the file behind this URL means "no subtitles"
    pub subtitles_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> StreamLayout {
        StreamLayout::new("/srv/streams", "/streams/")
    }

    #[test]
    fn manifest_url_maps_back_to_output_dir() {
        let layout = layout();
        let request = StreamRequest::new("alice", StreamMode::Video, "/m/a.mkv");
        let session = Session::new(&request, &layout);

        let resolved = layout
            .resolve_url(&session.manifest_url())
            .expect("url under prefix");

        assert_eq!(resolved.parent(), Some(session.output_dir()));
        assert_eq!(resolved, session.manifest_path());
    }

    #[test]
    fn dir_url_is_stable_for_an_id() {
        let layout = layout();
        let id = SessionId::new();
        assert_eq!(layout.dir_url_for(&id), layout.dir_url_for(&id));
        assert_eq!(layout.dir_url_for(&id), format!("/streams/{id}/"));
        assert_eq!(layout.dir_for(&id), Path::new("/srv/streams").join(id.to_string()));
    }

    #[test]
    fn resolve_url_rejects_escapes_and_foreign_prefixes() {
        let layout = layout();
        assert!(layout.resolve_url("/streams/../etc/passwd").is_none());
        assert!(layout.resolve_url("/streams/./x").is_none());
        assert!(layout.resolve_url("/media/abc/index.m3u8").is_none());
        assert!(layout.resolve_url("/streamsabc/index.m3u8").is_none());
    }

    #[test]
    fn resolve_url_ignores_query_strings() {
        let layout = layout();
        let resolved = layout.resolve_url("/streams/abc/index.m3u8?t=42");
        assert_eq!(
            resolved,
            Some(PathBuf::from("/srv/streams/abc/index.m3u8"))
        );
    }

    #[test]
    fn audio_sessions_advertise_no_subtitles() {
        let layout = layout();
        let request =
            StreamRequest::new("bob", StreamMode::AudioOnly, "/m/song.flac");
        let info = Session::new(&request, &layout).info(SessionState::Ready);
        assert!(info.subtitles_url.is_none());
        assert!(info.manifest_url.ends_with("/index.m3u8"));
    }

    #[test]
    fn mode_accepts_short_aliases() {
        let mode: StreamMode = serde_json::from_str("\"audio\"").unwrap();
        assert_eq!(mode, StreamMode::AudioOnly);
        let policy: OutputPolicy = serde_json::from_str("\"vod\"").unwrap();
        assert_eq!(policy, OutputPolicy::Complete);
    }
}
