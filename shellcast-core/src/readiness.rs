//! Decides when a session's output is safe to hand to a player.
//!
//! Rolling and complete output use separate routines: rolling output is
//! polled, complete output waits on the encoder's exit and checks once.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, StreamError};
use crate::manifest::{self, ManifestSnapshot};
use crate::process::{ExitOutcome, ExitWatch};
use crate::session::{OutputPolicy, Session};
use crate::settings::ReadinessSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Waiting,
    Ready,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    settings: ReadinessSettings,
    segment_seconds: u32,
}

impl ReadinessDetector {
    pub fn new(settings: ReadinessSettings, segment_seconds: u32) -> Self {
        Self {
            settings,
            segment_seconds,
        }
    }

    pub fn timeout_for(&self, policy: OutputPolicy) -> Duration {
        match policy {
            OutputPolicy::Rolling => {
                self.settings.rolling_timeout(self.segment_seconds)
            }
            OutputPolicy::Complete => self.settings.complete_timeout,
        }
    }

    /// Blocks until the session is playable, failed, timed out or cancelled.
    pub async fn await_ready(
        &self,
        session: &Session,
        exit: ExitWatch,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match session.policy() {
            OutputPolicy::Rolling => self.await_rolling(session, exit, cancel).await,
            OutputPolicy::Complete => {
                self.await_complete(session, exit, cancel).await
            }
        }
    }

    /// Polls the manifest until it lists enough segments. An encoder exit
    /// ends the wait early.
    pub async fn await_rolling(
        &self,
        session: &Session,
        mut exit: ExitWatch,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let limit = self.timeout_for(OutputPolicy::Rolling);
        let started = Instant::now();
        let deadline = started + limit;
        let manifest_path = session.manifest_path();

        let mut poll = interval(at_least_a_tick(self.settings.poll_interval));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut progress = self.progress_ticker(started);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(StreamError::Cancelled(session.id()));
                }
                outcome = exit.wait() => {
                    let snapshot = manifest::read(&manifest_path).await;
                    return match self.evaluate_rolling(snapshot) {
                        Readiness::Ready if outcome.success() => Ok(()),
                        _ => Err(early_exit(outcome, self.settings.min_segments)),
                    };
                }
                _ = poll.tick() => {
                    let snapshot = manifest::read(&manifest_path).await;
                    if self.evaluate_rolling(snapshot) == Readiness::Ready {
                        debug!(
                            session_id = %session.id(),
                            elapsed = ?started.elapsed(),
                            "rolling manifest ready"
                        );
                        return Ok(());
                    }
                }
                _ = progress.tick() => {
                    info!(
                        session_id = %session.id(),
                        elapsed = ?started.elapsed(),
                        "still waiting for a playable manifest"
                    );
                }
                _ = sleep_until(deadline) => {
                    return Err(StreamError::ReadinessTimeout {
                        manifest: manifest_path,
                        waited: limit,
                    });
                }
            }
        }
    }

    /// Waits for the encoder to finish, then checks the manifest exactly
    /// once. The filesystem is not touched while the encode runs.
    pub async fn await_complete(
        &self,
        session: &Session,
        mut exit: ExitWatch,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let limit = self.timeout_for(OutputPolicy::Complete);
        let started = Instant::now();
        let deadline = started + limit;
        let mut progress = self.progress_ticker(started);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(StreamError::Cancelled(session.id()));
                }
                outcome = exit.wait() => {
                    let snapshot = if outcome.success() {
                        manifest::read(&session.manifest_path()).await
                    } else {
                        None
                    };
                    return match evaluate_complete(outcome, snapshot) {
                        Readiness::Ready => Ok(()),
                        _ if !outcome.success() => Err(StreamError::ProcessExit {
                            code: outcome.code,
                            detail: outcome.to_string(),
                        }),
                        _ => Err(StreamError::ProcessExit {
                            code: outcome.code,
                            detail: "manifest lacks a header or end-of-stream marker"
                                .to_string(),
                        }),
                    };
                }
                _ = progress.tick() => {
                    info!(
                        session_id = %session.id(),
                        elapsed = ?started.elapsed(),
                        "encode still running"
                    );
                }
                _ = sleep_until(deadline) => {
                    return Err(StreamError::ReadinessTimeout {
                        manifest: session.manifest_path(),
                        waited: limit,
                    });
                }
            }
        }
    }

    pub fn evaluate_rolling(&self, snapshot: Option<ManifestSnapshot>) -> Readiness {
        match snapshot {
            Some(s)
                if s.is_playable(
                    self.settings.min_manifest_bytes,
                    self.settings.min_segments,
                ) =>
            {
                Readiness::Ready
            }
            _ => Readiness::Waiting,
        }
    }

    fn progress_ticker(&self, started: Instant) -> tokio::time::Interval {
        let every = at_least_a_tick(self.settings.progress_interval);
        let mut ticker = interval_at(started + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }
}

/// `interval` panics on a zero period.
pub(crate) fn at_least_a_tick(period: Duration) -> Duration {
    period.max(Duration::from_millis(1))
}

/// Complete output is ready only after a clean exit with a finalized
/// manifest. There is no waiting state once the encoder is gone.
pub fn evaluate_complete(
    outcome: ExitOutcome,
    snapshot: Option<ManifestSnapshot>,
) -> Readiness {
    match snapshot {
        Some(s) if outcome.success() && s.is_complete() => Readiness::Ready,
        _ => Readiness::Failed,
    }
}

fn early_exit(outcome: ExitOutcome, min_segments: usize) -> StreamError {
    let detail = if outcome.success() {
        format!("encoder finished before listing {min_segments} segments")
    } else {
        outcome.to_string()
    };
    StreamError::ProcessExit {
        code: outcome.code,
        detail,
    }
}
