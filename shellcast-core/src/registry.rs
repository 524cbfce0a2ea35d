use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::EncodeCommandBuilder;
use crate::error::{Result, StreamError};
use crate::process::{ExitWatch, ProcessHandle, ProcessSupervisor, StopOutcome};
use crate::readiness::ReadinessDetector;
use crate::session::{
    Owner, Session, SessionId, SessionInfo, SessionState, StreamLayout, StreamRequest,
};
use crate::settings::StreamSettings;
use crate::subtitles::SubtitleExtractor;

/// View of which output directories are currently owned by a session.
pub trait SessionIndex: Send + Sync {
    fn live_dirs(&self) -> Vec<PathBuf>;
}

type SessionTable = DashMap<SessionId, Arc<LiveSession>>;

#[derive(Debug)]
struct LiveSession {
    session: Session,
    state: Mutex<SessionState>,
    process: ProcessHandle,
    /// Aborts the readiness wait and the subtitle task
    cancel: CancellationToken,
}

impl LiveSession {
    fn info(&self) -> SessionInfo {
        self.session.info(*self.state.lock())
    }
}

/// Single source of truth for running sessions.
///
/// At most one live session per owner: `create` evicts the owner's existing
/// sessions before starting a new one, serialised per owner.
#[derive(Debug)]
pub struct SessionRegistry {
    layout: StreamLayout,
    commands: EncodeCommandBuilder,
    supervisor: ProcessSupervisor,
    readiness: ReadinessDetector,
    subtitles: SubtitleExtractor,
    sessions: Arc<SessionTable>,
    owner_gates: DashMap<Owner, Arc<tokio::sync::Mutex<()>>>,
}

impl SessionRegistry {
    pub fn new(settings: &StreamSettings) -> Self {
        Self {
            layout: StreamLayout::new(&settings.output_root, &settings.public_base_url),
            commands: EncodeCommandBuilder::new(&settings.ffmpeg_path, settings.encode.clone()),
            supervisor: ProcessSupervisor::new(settings.supervisor.clone()),
            readiness: ReadinessDetector::new(
                settings.readiness.clone(),
                settings.encode.segment_seconds,
            ),
            subtitles: SubtitleExtractor::new(
                &settings.ffmpeg_path,
                &settings.ffprobe_path,
                settings.subtitles.clone(),
            ),
            sessions: Arc::new(DashMap::new()),
            owner_gates: DashMap::new(),
        }
    }

    pub fn layout(&self) -> &StreamLayout {
        &self.layout
    }

    /// Starts a session and blocks until its output is playable.
    ///
    /// On any failure the session is torn down (process stopped, directory
    /// removed, entry erased) before the error is returned. Once the encoder
    /// is running the wait continues on its own task, so dropping this
    /// future still settles the session either way.
    pub async fn create(&self, request: StreamRequest) -> Result<Session> {
        validate_source(&request.source).await?;

        let gate = self.owner_gate(&request.owner);
        let started = {
            let _guard = gate.lock().await;
            self.evict_owner(&request.owner).await;
            self.launch(&request).await
        };
        self.release_gate(&request.owner, gate);
        let (session, cancel, exit) = started?;

        let id = session.id();
        let pending = tokio::spawn(settle(
            Arc::clone(&self.sessions),
            self.readiness.clone(),
            session,
            cancel,
            exit,
        ));
        match pending.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(StreamError::Cancelled(id)),
        }
    }

    /// Directory, process, registration and subtitle task. Runs under the
    /// owner's gate.
    async fn launch(
        &self,
        request: &StreamRequest,
    ) -> Result<(Session, CancellationToken, ExitWatch)> {
        let session = Session::new(request, &self.layout);
        let dir = session.output_dir();

        if let Err(e) = fs::create_dir_all(dir).await {
            remove_dir(dir).await;
            return Err(e.into());
        }

        let command = self.commands.build(&session);
        debug!(session_id = %session.id(), %command, "launching encoder");

        let process = match self
            .supervisor
            .start(&command, &session.stdout_log(), &session.stderr_log())
            .await
        {
            Ok(process) => process,
            Err(e) => {
                remove_dir(dir).await;
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let exit = process.exit_watch();
        self.sessions.insert(
            session.id(),
            Arc::new(LiveSession {
                session: session.clone(),
                state: Mutex::new(SessionState::Starting),
                process,
                cancel: cancel.clone(),
            }),
        );

        if session.mode().carries_subtitles() && self.subtitles.enabled() {
            self.subtitles.spawn(session.clone(), cancel.child_token());
        }

        Ok((session, cancel, exit))
    }

    pub fn get(&self, id: &SessionId) -> Result<SessionInfo> {
        self.sessions
            .get(id)
            .map(|live| live.info())
            .ok_or(StreamError::NotFound(*id))
    }

    pub fn session(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id).map(|live| live.session.clone())
    }

    /// Stops a session. Unknown or already stopped ids are a no-op and
    /// return `None`.
    ///
    /// The entry stays visible (as `stopping`) until the directory is gone,
    /// so the reaper never sees a directory that is still being written.
    pub async fn stop(&self, id: &SessionId) -> Option<StopOutcome> {
        stop_entry(&self.sessions, id).await
    }

    /// Stops `id` only when it belongs to `owner`. Returns whether a
    /// session was stopped.
    pub async fn stop_owned(&self, id: &SessionId, owner: &Owner) -> bool {
        let owned = self
            .sessions
            .get(id)
            .is_some_and(|live| live.session.owner() == owner);
        owned && self.stop(id).await.is_some()
    }

    pub fn list_all(&self) -> Vec<SessionInfo> {
        self.sessions.iter().map(|entry| entry.info()).collect()
    }

    pub fn owner_sessions(&self, owner: &Owner) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|entry| entry.session.owner() == owner)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Stops every tracked session concurrently.
    pub async fn shutdown(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| *e.key()).collect();
        if ids.is_empty() {
            return;
        }
        info!(sessions = ids.len(), "stopping all sessions");
        join_all(ids.iter().map(|id| self.stop(id))).await;
    }

    async fn evict_owner(&self, owner: &Owner) {
        for id in self.owner_sessions(owner) {
            debug!(session_id = %id, %owner, "evicting previous session");
            self.stop(&id).await;
        }
    }

    fn owner_gate(&self, owner: &Owner) -> Arc<tokio::sync::Mutex<()>> {
        self.owner_gates
            .entry(owner.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn release_gate(&self, owner: &Owner, gate: Arc<tokio::sync::Mutex<()>>) {
        drop(gate);
        self.owner_gates
            .remove_if(owner, |_, gate| Arc::strong_count(gate) == 1);
    }
}

impl SessionIndex for SessionRegistry {
    fn live_dirs(&self) -> Vec<PathBuf> {
        self.sessions
            .iter()
            .map(|entry| entry.session.output_dir().to_path_buf())
            .collect()
    }
}

/// Waits for readiness and tears the session down when it never comes.
async fn settle(
    sessions: Arc<SessionTable>,
    readiness: ReadinessDetector,
    session: Session,
    cancel: CancellationToken,
    exit: ExitWatch,
) -> Result<Session> {
    match readiness.await_ready(&session, exit, &cancel).await {
        Ok(()) => {
            if let Some(live) = sessions.get(&session.id()) {
                let mut state = live.state.lock();
                if *state == SessionState::Starting {
                    *state = SessionState::Ready;
                }
            }
            info!(
                session_id = %session.id(),
                owner = %session.owner(),
                mode = session.mode().label(),
                policy = session.policy().label(),
                "session ready"
            );
            Ok(session)
        }
        Err(e) => {
            warn!(session_id = %session.id(), "session failed to start: {}", e);
            stop_entry(&sessions, &session.id()).await;
            Err(e)
        }
    }
}

async fn stop_entry(sessions: &SessionTable, id: &SessionId) -> Option<StopOutcome> {
    let live = sessions.get(id).map(|entry| Arc::clone(entry.value()))?;

    *live.state.lock() = SessionState::Stopping;
    live.cancel.cancel();

    let outcome = live.process.stop().await;
    let dir = live.session.output_dir();
    if outcome.confirmed() {
        remove_dir(dir).await;
    } else {
        warn!(
            session_id = %id,
            pid = live.process.pid(),
            dir = %dir.display(),
            "encoder exit unconfirmed; leaving directory to the reaper"
        );
    }

    sessions.remove(id);
    info!(session_id = %id, owner = %live.session.owner(), ?outcome, "session stopped");
    Some(outcome)
}

/// The caller resolves sources against the media root; this only guards
/// against being handed something unusable.
async fn validate_source(source: &Path) -> Result<()> {
    if source.as_os_str().is_empty() {
        return Err(StreamError::Validation("empty source path".to_string()));
    }
    if !source.is_absolute() {
        return Err(StreamError::Validation(format!(
            "source path must be absolute: {}",
            source.display()
        )));
    }
    match fs::metadata(source).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(StreamError::Validation(format!(
            "source is not a regular file: {}",
            source.display()
        ))),
        Err(_) => Err(StreamError::Validation(format!(
            "source does not exist: {}",
            source.display()
        ))),
    }
}

async fn remove_dir(dir: &Path) {
    match fs::remove_dir_all(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "session directory removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), "failed to remove session directory: {}", e),
    }
}
