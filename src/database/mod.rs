//! Backup subsystem for the live database file: snapshot naming, the snapshot
//! store, tiered retention, the backup manager that drives one cycle, the
//! background scheduler and status reporting.

pub mod backup;
pub mod backup_naming;
pub mod retention;
pub mod scheduler;
pub mod status;
pub mod storage;

use std::path::PathBuf;

/// Error type for backup operations
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Source database not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unsafe snapshot name. Callers outside the subsystem must
    /// see this exactly like `NotFound`.
    #[error("Invalid backup name: {0}")]
    InvalidName(String),

    #[error("Backup not found")]
    NotFound,

    #[error("A backup run is already in progress")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notification error: {0}")]
    Notify(String),
}

/// Result type for backup operations
pub type Result<T> = std::result::Result<T, BackupError>;
