//! Storage module for snapshot artifacts
//!
//! This module provides the abstraction the backup manager talks to when it
//! creates, lists, resolves and deletes snapshots, plus the directory-backed
//! implementation used in production.

use std::path::PathBuf;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::database::Result;

pub mod local_storage;

pub use local_storage::LocalSnapshotStore;

/// One retained backup artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Canonical name, also the filename
    pub name: String,
    /// Capture time parsed from `name`
    pub captured_at: NaiveDateTime,
    /// Size of the artifact as read from storage
    pub size_bytes: u64,
}

/// Provides a unified interface for snapshot storage operations
///
/// The store exclusively owns its artifacts; nothing else writes or deletes
/// in the backing location.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    /// Copy the live database into a new snapshot named for `captured_at`
    ///
    /// Fails with `SourceNotFound` when the live file is absent and with `Io`
    /// when the copy cannot complete. The source is only ever read.
    async fn create(&self, captured_at: NaiveDateTime) -> Result<Snapshot>;

    /// All recognised snapshots, newest first
    async fn list(&self) -> Result<Vec<Snapshot>>;

    /// Safe path of an existing snapshot, or `NotFound` for any name that is
    /// absent, malformed or unsafe
    async fn resolve(&self, name: &str) -> Result<PathBuf>;

    /// Remove a snapshot; removing one that is already gone is not an error
    async fn delete(&self, name: &str) -> Result<()>;

    /// Path of the live database file
    fn source_path(&self) -> PathBuf;

    /// Location snapshots are kept in
    fn backup_dir(&self) -> PathBuf;
}
