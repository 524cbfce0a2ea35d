//! # Shellcast Core
//!
//! Transcoding session manager for the Shellcast media server: turns a stored
//! media file into a live HLS output by supervising an external encoder
//! (ffmpeg), and keeps the process table and the output directory in step.
//!
//! ## Overview
//!
//! - **Sessions**: one encoder process and one output directory per session,
//!   at most one live session per owner
//! - **Readiness**: `create` returns only once the playlist is playable, or
//!   fails with the session already torn down
//! - **Subtitles**: embedded text tracks are extracted to WebVTT sidecars in
//!   the background
//! - **Reclamation**: an orphan reaper removes directories no session owns
//!
//! ## Architecture
//!
//! - [`session`]: session model and the directory/URL rule
//! - [`command`]: pure encoder invocation building
//! - [`process`]: subprocess supervision and two-stage termination
//! - [`readiness`]: rolling and complete playability detection
//! - [`registry`]: the concurrent session table
//! - [`subtitles`]: sidecar subtitle extraction
//! - [`reaper`]: orphaned directory sweeps
//!
//! ## Examples
//!
//! ```no_run
//! use shellcast_core::{SessionRegistry, StreamMode, StreamRequest, StreamSettings};
//!
//! async fn start(registry: &SessionRegistry) -> shellcast_core::Result<String> {
//!     let request = StreamRequest::new("alice", StreamMode::Video, "/media/film.mkv");
//!     let session = registry.create(request).await?;
//!     Ok(session.manifest_url())
//! }
//!
//! let registry = SessionRegistry::new(&StreamSettings::default());
//! # let _ = registry;
//! ```

pub mod command;
pub mod error;
pub mod manifest;
pub mod process;
pub mod readiness;
pub mod reaper;
pub mod registry;
pub mod session;
pub mod settings;
pub mod subtitles;

pub use command::{EncodeCommand, EncodeCommandBuilder};
pub use error::{Result, StreamError};
pub use process::{ExitOutcome, ExitWatch, ProcessHandle, ProcessSupervisor, StopOutcome};
pub use readiness::{Readiness, ReadinessDetector};
pub use reaper::{OrphanReaper, ReapReport};
pub use registry::{SessionIndex, SessionRegistry};
pub use session::{
    OutputPolicy, Owner, Session, SessionId, SessionInfo, SessionState, StreamLayout,
    StreamMode, StreamRequest,
};
pub use settings::{
    AudioSettings, EncodeSettings, ReadinessSettings, ReaperSettings, StreamSettings,
    SubtitleSettings, SupervisorSettings, VideoSettings,
};
pub use subtitles::{SubtitleExtractor, SubtitleTrack};
