//! Read-only view of the backup subsystem for administrators

use std::path::PathBuf;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::{BackupConfig, RetentionConfig};
use crate::database::backup::{BackupManager, RunState};
use crate::database::storage::SnapshotStorage;
use crate::database::Result;

/// Current state of backups
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupStatus {
    pub enabled: bool,
    pub interval_hours: u64,
    pub backup_dir: PathBuf,
    /// Newest snapshot's capture time, or the last in-memory run when the
    /// directory holds none
    pub last_backup_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    pub count: usize,
    pub total_size_bytes: u64,
    pub retention: RetentionConfig,
    /// Whether a cycle is executing right now
    pub run_state: RunState,
}

/// Gather status from storage and the manager's run record. Never mutates.
pub async fn report(config: &BackupConfig, manager: &BackupManager) -> Result<BackupStatus> {
    let snapshots = manager.storage().list().await?;
    let record = manager.record().await;

    let last_backup_at = snapshots
        .first()
        .map(|s| s.captured_at)
        .or(record.last_run_at);

    Ok(BackupStatus {
        enabled: config.enabled,
        interval_hours: config.interval_hours,
        backup_dir: manager.storage().backup_dir(),
        last_backup_at,
        last_error: record.last_error,
        count: snapshots.len(),
        total_size_bytes: snapshots.iter().map(|s| s.size_bytes).sum(),
        retention: *manager.retention(),
        run_state: manager.state(),
    })
}
