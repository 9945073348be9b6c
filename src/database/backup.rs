//! Backup cycle orchestration
//!
//! One cycle copies the live database into a new snapshot and then applies the
//! retention policy to the full post-create snapshot set. Manual and scheduled
//! runs share `run_once`.

use std::sync::Arc;
use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::RetentionConfig;
use crate::database::retention;
use crate::database::storage::{Snapshot, SnapshotStorage};
use crate::database::{BackupError, Result};

/// Whether a cycle is currently executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Running,
}

/// In-memory record of the last attempt; lost on restart
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRecord {
    /// When the last attempt finished, successful or not
    pub last_run_at: Option<NaiveDateTime>,
    /// Error of the last attempt, cleared by the next success
    pub last_error: Option<String>,
}

/// Counts from one retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub kept: usize,
    pub deleted: usize,
    pub errors: usize,
}

/// Result of a successful backup cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    pub snapshot: Snapshot,
    pub cleanup: CleanupReport,
}

/// Drives backup cycles against a snapshot store
pub struct BackupManager {
    /// Storage backend for snapshots
    storage: Arc<dyn SnapshotStorage>,
    /// Retention windows applied after each backup
    retention: RetentionConfig,
    clock: Arc<dyn Clock>,
    record: Mutex<RunRecord>,
    /// Held for the duration of a cycle; never waited on
    run_lock: Mutex<()>,
}

impl BackupManager {
    /// Create a new backup manager
    pub fn new(
        storage: Arc<dyn SnapshotStorage>,
        retention: RetentionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            retention,
            clock,
            record: Mutex::new(RunRecord::default()),
            run_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Arc<dyn SnapshotStorage> {
        &self.storage
    }

    pub fn retention(&self) -> &RetentionConfig {
        &self.retention
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Snapshot of the last-run record
    pub async fn record(&self) -> RunRecord {
        self.record.lock().await.clone()
    }

    pub fn state(&self) -> RunState {
        match self.run_lock.try_lock() {
            Ok(_) => RunState::Idle,
            Err(_) => RunState::Running,
        }
    }

    /// Run one backup cycle: create a snapshot, then apply retention.
    ///
    /// A cycle already in flight is not re-entered; the call returns
    /// `AlreadyRunning` instead.
    pub async fn run_once(&self) -> Result<BackupReport> {
        let _running = self.run_lock.try_lock().map_err(|_| {
            warn!("Backup requested while another run is in progress, skipping");
            BackupError::AlreadyRunning
        })?;

        let now = self.clock.now();

        let snapshot = match self.storage.create(now).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Backup failed");
                let mut record = self.record.lock().await;
                record.last_run_at = Some(now);
                record.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let cleanup = self.apply_retention(now).await;

        {
            let mut record = self.record.lock().await;
            record.last_run_at = Some(now);
            record.last_error = None;
        }

        Ok(BackupReport { snapshot, cleanup })
    }

    /// Apply retention without creating a snapshot
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        let _running = self.run_lock.try_lock().map_err(|_| {
            warn!("Cleanup requested while another run is in progress, skipping");
            BackupError::AlreadyRunning
        })?;

        let now = self.clock.now();
        let snapshots = self.storage.list().await?;

        Ok(self.delete_unretained(now, &snapshots).await)
    }

    /// Retention pass after a successful create. Failures here are counted,
    /// never propagated.
    async fn apply_retention(&self, now: NaiveDateTime) -> CleanupReport {
        match self.storage.list().await {
            Ok(snapshots) => self.delete_unretained(now, &snapshots).await,
            Err(e) => {
                error!(error = %e, "Could not list backups for cleanup");
                CleanupReport {
                    errors: 1,
                    ..CleanupReport::default()
                }
            }
        }
    }

    async fn delete_unretained(&self, now: NaiveDateTime, snapshots: &[Snapshot]) -> CleanupReport {
        let plan = retention::plan(now, snapshots, &self.retention);

        let mut report = CleanupReport {
            kept: plan.keep.len(),
            ..CleanupReport::default()
        };

        for name in &plan.delete {
            match self.storage.delete(name).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    report.errors += 1;
                    error!(name = %name, error = %e, "Failed to delete backup");
                }
            }
        }

        info!(
            kept = report.kept,
            deleted = report.deleted,
            errors = report.errors,
            "Backup cleanup"
        );

        report
    }
}
