//! Encoder subprocess supervision.
//!
//! Each spawned process is owned by a monitor task; the [`ProcessHandle`]
//! talks to it through a cancellation token (terminate) and a watch channel
//! (status). Dropping the handle requests termination.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::EncodeCommand;
use crate::error::{Result, StreamError};
use crate::settings::SupervisorSettings;

/// Exit status snapshot of a finished process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    /// Terminating signal, when the process did not exit on its own
    pub signal: Option<i32>,
}

impl ExitOutcome {
    /// Status could not be collected
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "killed by signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// How a process came to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited without being asked to
    Natural,
    /// Exited within the graceful window after SIGTERM
    Graceful,
    /// Needed the forced kill
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Exited {
        outcome: ExitOutcome,
        termination: Termination,
    },
    /// Both termination windows elapsed without a confirmed exit
    Unresponsive,
}

/// Result of [`ProcessHandle::stop`]. Only a confirmed exit allows the
/// session directory to be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    AlreadyExited(ExitOutcome),
    Graceful(ExitOutcome),
    Forced(ExitOutcome),
    Unconfirmed,
}

impl StopOutcome {
    pub fn confirmed(&self) -> bool {
        !matches!(self, Self::Unconfirmed)
    }
}

/// Read side of a process's exit status.
#[derive(Debug, Clone)]
pub struct ExitWatch(watch::Receiver<ProcessStatus>);

impl ExitWatch {
    pub fn current(&self) -> Option<ExitOutcome> {
        match *self.0.borrow() {
            ProcessStatus::Exited { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    /// Resolves once the process has exited. A vanished monitor counts as an
    /// exit with unknown status.
    pub async fn wait(&mut self) -> ExitOutcome {
        let exited = self
            .0
            .wait_for(|status| matches!(status, ProcessStatus::Exited { .. }))
            .await;
        match exited.as_deref() {
            Ok(ProcessStatus::Exited { outcome, .. }) => *outcome,
            _ => ExitOutcome::unknown(),
        }
    }
}

/// Exclusive handle to one supervised encoder process.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    program: String,
    terminate: CancellationToken,
    status: watch::Receiver<ProcessStatus>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn status(&self) -> ProcessStatus {
        *self.status.borrow()
    }

    pub fn exit_watch(&self) -> ExitWatch {
        ExitWatch(self.status.clone())
    }

    /// Graceful then forced termination. Idempotent, and bounded by the
    /// supervisor's two windows.
    pub async fn stop(&self) -> StopOutcome {
        self.terminate.cancel();

        let mut status = self.status.clone();
        let settled = status
            .wait_for(|s| !matches!(s, ProcessStatus::Running))
            .await
            .map(|s| *s);

        match settled {
            Ok(ProcessStatus::Exited {
                outcome,
                termination,
            }) => match termination {
                Termination::Natural => StopOutcome::AlreadyExited(outcome),
                Termination::Graceful => StopOutcome::Graceful(outcome),
                Termination::Forced => StopOutcome::Forced(outcome),
            },
            // Monitor gone without reporting: the child was dropped with
            // kill_on_drop but nobody saw it go.
            Ok(_) | Err(_) => StopOutcome::Unconfirmed,
        }
    }
}

#[cfg(test)]
impl ProcessHandle {
    /// Handle whose status is driven by the caller instead of a monitor.
    pub(crate) fn detached(status: watch::Receiver<ProcessStatus>) -> Self {
        Self {
            pid: None,
            program: "detached".to_string(),
            terminate: CancellationToken::new(),
            status,
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.terminate.cancel();
    }
}

/// Starts encoder processes and owns the termination policy.
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor {
    settings: SupervisorSettings,
}

impl ProcessSupervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        Self { settings }
    }

    /// Launches `command` with stdout and stderr redirected to the given
    /// files (truncated). Fails fast when the program cannot be spawned.
    pub async fn start(
        &self,
        command: &EncodeCommand,
        stdout_log: &Path,
        stderr_log: &Path,
    ) -> Result<ProcessHandle> {
        let stdout = tokio::fs::File::create(stdout_log).await?.into_std().await;
        let stderr = tokio::fs::File::create(stderr_log).await?.into_std().await;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| StreamError::ProcessStart {
            program: command.program.clone(),
            source,
        })?;
        let pid = child.id();
        info!(pid, program = %command.program, "encoder started");

        let terminate = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(ProcessStatus::Running);
        tokio::spawn(monitor(
            child,
            terminate.clone(),
            status_tx,
            self.settings.clone(),
        ));

        Ok(ProcessHandle {
            pid,
            program: command.program.clone(),
            terminate,
            status: status_rx,
        })
    }
}

async fn monitor(
    mut child: Child,
    terminate: CancellationToken,
    status_tx: watch::Sender<ProcessStatus>,
    windows: SupervisorSettings,
) {
    let pid = child.id();

    let exited = tokio::select! {
        result = child.wait() => Some((result, Termination::Natural)),
        _ = terminate.cancelled() => terminate_child(&mut child, &windows).await,
    };

    let (result, termination) = match exited {
        Some(exited) => exited,
        None => {
            warn!(pid, "encoder survived the forced kill window");
            status_tx.send_replace(ProcessStatus::Unresponsive);
            (child.wait().await, Termination::Forced)
        }
    };

    let outcome = match result {
        Ok(status) => ExitOutcome::from(status),
        Err(e) => {
            warn!(pid, "failed to collect encoder exit status: {}", e);
            ExitOutcome::unknown()
        }
    };
    debug!(pid, %outcome, ?termination, "encoder exited");
    status_tx.send_replace(ProcessStatus::Exited {
        outcome,
        termination,
    });
}

async fn terminate_child(
    child: &mut Child,
    windows: &SupervisorSettings,
) -> Option<(io::Result<ExitStatus>, Termination)> {
    let pid = child.id();

    if let Err(e) = request_exit(child) {
        debug!(pid, "graceful termination request failed: {}", e);
    }
    if let Ok(result) = timeout(windows.graceful_window, child.wait()).await {
        return Some((result, Termination::Graceful));
    }

    warn!(pid, "encoder ignored termination request, killing");
    if let Err(e) = child.start_kill() {
        warn!(pid, "failed to kill encoder: {}", e);
    }
    timeout(windows.forced_window, child.wait())
        .await
        .ok()
        .map(|result| (result, Termination::Forced))
}

#[cfg(unix)]
fn request_exit(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn sh(script: &str) -> EncodeCommand {
        EncodeCommand {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: None,
        }
    }

    fn quick() -> ProcessSupervisor {
        ProcessSupervisor::new(SupervisorSettings {
            graceful_window: Duration::from_millis(500),
            forced_window: Duration::from_millis(500),
        })
    }

    #[tokio::test]
    async fn redirects_output_to_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let (out, err) = (dir.path().join("out"), dir.path().join("err"));

        let handle = quick()
            .start(&sh("echo hello; echo oops >&2"), &out, &err)
            .await
            .unwrap();
        let outcome = handle.exit_watch().wait().await;

        assert!(outcome.success());
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello\n");
        assert_eq!(std::fs::read_to_string(&err).unwrap(), "oops\n");
    }

    #[tokio::test]
    async fn reports_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let handle = quick()
            .start(&sh("exit 3"), &dir.path().join("o"), &dir.path().join("e"))
            .await
            .unwrap();
        let outcome = handle.exit_watch().wait().await;
        assert_eq!(outcome.code, Some(3));
        assert!(matches!(handle.stop().await, StopOutcome::AlreadyExited(_)));
    }

    #[tokio::test]
    async fn sigterm_stops_cooperative_process() {
        let dir = tempfile::tempdir().unwrap();
        let handle = quick()
            .start(&sh("exec sleep 30"), &dir.path().join("o"), &dir.path().join("e"))
            .await
            .unwrap();

        let outcome = handle.stop().await;
        assert!(matches!(outcome, StopOutcome::Graceful(_)));
        // Idempotent
        assert_eq!(handle.stop().await, outcome);
    }

    #[tokio::test]
    async fn escalates_when_sigterm_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let handle = quick()
            .start(
                &sh("trap '' TERM; while :; do sleep 0.05; done"),
                &dir.path().join("o"),
                &dir.path().join("e"),
            )
            .await
            .unwrap();
        // Give the shell time to install its trap
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        let outcome = handle.stop().await;
        assert!(matches!(outcome, StopOutcome::Forced(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn missing_program_is_a_start_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = EncodeCommand {
            program: dir.path().join("no-such-ffmpeg").display().to_string(),
            args: Vec::new(),
            working_dir: None,
        };
        let err = quick()
            .start(&cmd, &dir.path().join("o"), &dir.path().join("e"))
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::ProcessStart { .. }));
    }
}
