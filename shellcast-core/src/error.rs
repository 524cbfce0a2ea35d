use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::session::SessionId;

/// Failures surfaced by the session manager.
///
/// Stopping a session never produces one of these; subtitle extraction
/// failures are logged inside the extractor and never reach this type.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("invalid source: {0}")]
    Validation(String),

    #[error("failed to launch {program}: {source}")]
    ProcessStart {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "timed out after {waited:?} waiting for a playable manifest at {}",
        manifest.display()
    )]
    ReadinessTimeout { manifest: PathBuf, waited: Duration },

    #[error("encoder exited before the output became playable: {detail}")]
    ProcessExit { code: Option<i32>, detail: String },

    #[error("session {0} was stopped before it became ready")]
    Cancelled(SessionId),

    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// Whether the encoder itself is to blame (as opposed to the caller or
    /// the host).
    pub fn is_encoder_failure(&self) -> bool {
        matches!(
            self,
            Self::ReadinessTimeout { .. } | Self::ProcessExit { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
