use std::collections::HashSet;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::readiness::at_least_a_tick;
use crate::registry::SessionIndex;
use crate::settings::ReaperSettings;

/// Outcome of one sweep over the output root.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReapReport {
    pub removed: Vec<PathBuf>,
    /// Untracked but inside the grace period
    pub young: usize,
    pub live: usize,
    pub failed: usize,
}

/// Background sweep deleting session directories nobody tracks.
///
/// Absence from the registry alone never authorizes deletion: a directory
/// must also be older than the grace period, so a session still being
/// created is safe.
pub struct OrphanReaper {
    output_root: PathBuf,
    index: Arc<dyn SessionIndex>,
    settings: ReaperSettings,
}

impl std::fmt::Debug for OrphanReaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrphanReaper")
            .field("output_root", &self.output_root)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl OrphanReaper {
    pub fn new(
        output_root: impl Into<PathBuf>,
        index: Arc<dyn SessionIndex>,
        settings: ReaperSettings,
    ) -> Self {
        Self {
            output_root: output_root.into(),
            index,
            settings,
        }
    }

    /// Start the background sweep; stops when `cancel` fires.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(at_least_a_tick(self.settings.interval));

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("orphan reaper stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let report = self.sweep().await;
                        if !report.removed.is_empty() || report.failed > 0 {
                            info!(
                                removed = report.removed.len(),
                                failed = report.failed,
                                "orphan sweep finished"
                            );
                        }
                    }
                }
            }
        })
    }

    pub async fn sweep(&self) -> ReapReport {
        let mut report = ReapReport::default();

        // Snapshot first: a session registered after this point has a
        // directory younger than the grace period.
        let live: HashSet<OsString> = self
            .index
            .live_dirs()
            .iter()
            .filter_map(|dir| dir.file_name().map(OsString::from))
            .collect();

        let mut entries = match fs::read_dir(&self.output_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
            Err(e) => {
                warn!(
                    root = %self.output_root.display(),
                    "orphan sweep cannot list output root: {}", e
                );
                return report;
            }
        };

        let now = SystemTime::now();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("orphan sweep aborted mid-listing: {}", e);
                    break;
                }
            };

            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            if live.contains(&entry.file_name()) {
                report.live += 1;
                continue;
            }

            let age = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => now.duration_since(modified).unwrap_or(Duration::ZERO),
                Err(e) => {
                    debug!(dir = %entry.path().display(), "cannot read directory age: {}", e);
                    continue;
                }
            };
            if age <= self.settings.grace_period {
                report.young += 1;
                continue;
            }

            let path = entry.path();
            match fs::remove_dir_all(&path).await {
                Ok(()) => {
                    info!(dir = %path.display(), age = ?age, "removed orphaned session directory");
                    report.removed.push(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(dir = %path.display(), "failed to remove orphaned directory: {}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}
