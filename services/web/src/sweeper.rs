//! Retention sweep over the upload directory.
//!
//! The sweep is the only mechanism that enforces the retention window, and it
//! is best-effort: a file is removed on the first sweep after it ages past
//! the window. Sweeps run opportunistically after uploads, never on a timer,
//! and nothing waits for them to finish.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long stored uploads are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub window: Duration,
}

impl RetentionPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }
}

/// Outcome of a single sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Regular files looked at
    pub scanned: usize,
    /// Files deleted (or found already gone)
    pub deleted: usize,
    /// Files whose age could not be read or that could not be deleted
    pub failed: usize,
}

/// Deletes uploads older than the retention window
#[derive(Debug)]
pub struct RetentionSweeper {
    dir: PathBuf,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(dir: impl Into<PathBuf>, policy: RetentionPolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
        }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Sweep at the current wall-clock time
    pub async fn sweep(&self) -> SweepReport {
        sweep_directory(&self.dir, self.policy.window, SystemTime::now()).await
    }

    /// Fire a sweep on the runtime without waiting for it.
    ///
    /// Failures inside the sweep are logged and dropped. The handle is only
    /// returned so tests can wait for completion.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<SweepReport> {
        let sweeper = Arc::clone(self);
        tokio::spawn(async move {
            let report = sweeper.sweep().await;

            metrics::counter!("dermascan_sweep_deleted_total").increment(report.deleted as u64);
            metrics::counter!("dermascan_sweep_failures_total").increment(report.failed as u64);

            if report.deleted > 0 || report.failed > 0 {
                info!(
                    dir = %sweeper.dir.display(),
                    scanned = report.scanned,
                    deleted = report.deleted,
                    failed = report.failed,
                    "Retention sweep finished"
                );
            } else {
                debug!(scanned = report.scanned, "Retention sweep found nothing to delete");
            }

            report
        })
    }
}

/// Delete every regular file in `dir` whose modification time is more than
/// `window` before `now`.
///
/// Subdirectories and symlinks are skipped, never descended into. A missing
/// directory is an empty sweep. Per-file errors are logged and counted; they
/// never stop the pass.
pub async fn sweep_directory(dir: &Path, window: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return report,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to list upload directory");
            report.failed += 1;
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to read directory entry");
                report.failed += 1;
                break;
            }
        };

        let path = entry.path();

        match entry.file_type().await {
            Ok(file_type) if file_type.is_file() => {}
            Ok(_) => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read file type");
                report.failed += 1;
                continue;
            }
        }

        report.scanned += 1;

        let modified = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read modification time");
                report.failed += 1;
                continue;
            }
        };

        // Modification times in the future count as age zero
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= window {
            continue;
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), age_secs = age.as_secs(), "Deleted expired upload");
                report.deleted += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Expired upload already gone");
                report.deleted += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete expired upload");
                report.failed += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    const HOUR: Duration = Duration::from_secs(3600);

    fn write_file_aged(dir: &Path, name: &str, age: Duration) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
        path
    }

    #[tokio::test]
    async fn test_deletes_only_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let old = write_file_aged(dir.path(), "upload_1_aaaa.jpg", 2 * HOUR);
        let young = write_file_aged(dir.path(), "upload_2_bbbb.jpg", Duration::from_secs(60));

        let report = sweep_directory(dir.path(), HOUR, SystemTime::now()).await;

        assert!(!old.exists());
        assert!(young.exists());
        assert_eq!(report.scanned, 2);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_later_sweep_time_expires_young_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file_aged(dir.path(), "upload_1_aaaa.png", Duration::ZERO);

        let report = sweep_directory(dir.path(), HOUR, SystemTime::now()).await;
        assert_eq!(report.deleted, 0);
        assert!(path.exists());

        let later = SystemTime::now() + 2 * HOUR;
        let report = sweep_directory(dir.path(), HOUR, later).await;
        assert_eq!(report.deleted, 1);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_and_missing_directory() {
        let dir = tempfile::tempdir().unwrap();

        let report = sweep_directory(dir.path(), HOUR, SystemTime::now()).await;
        assert_eq!(report, SweepReport::default());

        let missing = dir.path().join("does-not-exist");
        let report = sweep_directory(&missing, HOUR, SystemTime::now()).await;
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_file_aged(dir.path(), "a.jpg", 3 * HOUR);
        write_file_aged(dir.path(), "b.jpg", 3 * HOUR);

        let first = sweep_directory(dir.path(), HOUR, SystemTime::now()).await;
        let second = sweep_directory(dir.path(), HOUR, SystemTime::now()).await;

        assert_eq!(first.deleted, 2);
        assert_eq!(second, SweepReport::default());
    }

    #[tokio::test]
    async fn test_subdirectories_are_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("nested");
        std::fs::create_dir(&sub).unwrap();
        let inner = write_file_aged(&sub, "inner.jpg", 5 * HOUR);

        let report = sweep_directory(dir.path(), HOUR, SystemTime::now() + 10 * HOUR).await;

        assert!(sub.is_dir());
        assert!(inner.exists());
        assert_eq!(report.scanned, 0);
    }

    #[tokio::test]
    async fn test_spawned_sweep_reports() {
        let dir = tempfile::tempdir().unwrap();
        let old = write_file_aged(dir.path(), "old.webp", 2 * HOUR);

        let sweeper = Arc::new(RetentionSweeper::new(dir.path(), RetentionPolicy::new(HOUR)));
        let report = sweeper.spawn().await.unwrap();

        assert_eq!(report.deleted, 1);
        assert!(!old.exists());
    }
}
