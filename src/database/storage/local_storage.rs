//! Local filesystem implementation of the SnapshotStorage trait
//!
//! Snapshots live as flat files in one directory. Every name coming in from
//! the directory scan or from a caller goes through the naming service's
//! admission gate before a path is built from it.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::fs as tokio_fs;
use tracing::{debug, info, warn};

use crate::config::BackupConfig;
use crate::database::backup_naming::SnapshotNaming;
use crate::database::{BackupError, Result};

use super::{Snapshot, SnapshotStorage};

/// Provides local filesystem storage for snapshots
pub struct LocalSnapshotStore {
    /// Directory holding snapshot files
    backup_dir: PathBuf,
    /// Live database file
    source_path: PathBuf,
    naming: Arc<SnapshotNaming>,
}

impl LocalSnapshotStore {
    /// Create a new LocalSnapshotStore with the given configuration
    pub fn new(config: &BackupConfig, naming: Arc<SnapshotNaming>) -> Self {
        Self {
            backup_dir: config.backup_dir.clone(),
            source_path: config.database_path.clone(),
            naming,
        }
    }

    /// Hidden staging path a copy is written to before it becomes visible
    fn staging_path(&self, name: &str) -> PathBuf {
        self.backup_dir.join(format!(".{}.partial", name))
    }

    /// Textual screening plus the naming gate, before any path is built
    fn admit(&self, name: &str) -> Result<()> {
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            warn!(name, "Path traversal attempt detected");
            return Err(BackupError::InvalidName(name.to_string()));
        }

        // Must be a single plain path component as well
        let mut components = Path::new(name).components();
        if !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) {
            warn!(name, "Path traversal attempt detected");
            return Err(BackupError::InvalidName(name.to_string()));
        }

        if !self.naming.is_valid(name) {
            warn!(name, "Invalid backup filename");
            return Err(BackupError::InvalidName(name.to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl SnapshotStorage for LocalSnapshotStore {
    async fn create(&self, captured_at: NaiveDateTime) -> Result<Snapshot> {
        if !tokio_fs::try_exists(&self.source_path).await.unwrap_or(false) {
            return Err(BackupError::SourceNotFound(self.source_path.clone()));
        }

        // Ensure the backup directory exists
        tokio_fs::create_dir_all(&self.backup_dir).await?;

        let name = self.naming.format(captured_at);
        let staging = self.staging_path(&name);
        let dest_path = self.backup_dir.join(&name);

        // Copy to a name the directory scan ignores, then move into place
        let copied = match tokio_fs::copy(&self.source_path, &staging).await {
            Ok(_) => tokio_fs::rename(&staging, &dest_path).await,
            Err(e) => Err(e),
        };

        if let Err(e) = copied {
            let _ = tokio_fs::remove_file(&staging).await;
            if e.kind() == std::io::ErrorKind::NotFound
                && !tokio_fs::try_exists(&self.source_path).await.unwrap_or(false)
            {
                return Err(BackupError::SourceNotFound(self.source_path.clone()));
            }
            return Err(BackupError::Io(e));
        }

        let size_bytes = tokio_fs::metadata(&dest_path).await?.len();
        info!(name = %name, size_bytes, "Backup created");

        Ok(Snapshot {
            captured_at: self.naming.parse(&name).unwrap_or(captured_at),
            name,
            size_bytes,
        })
    }

    async fn list(&self) -> Result<Vec<Snapshot>> {
        if !tokio_fs::try_exists(&self.backup_dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut entries = tokio_fs::read_dir(&self.backup_dir).await?;
        let mut snapshots = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(captured_at) = self.naming.parse(&file_name) else {
                continue;
            };

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!(file_name = %file_name, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            snapshots.push(Snapshot {
                name: file_name,
                captured_at,
                size_bytes: metadata.len(),
            });
        }

        // Newest first
        snapshots.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));

        Ok(snapshots)
    }

    async fn resolve(&self, name: &str) -> Result<PathBuf> {
        self.admit(name).map_err(|_| BackupError::NotFound)?;

        let candidate = self.backup_dir.join(name);

        // Canonical containment check catches symlinks pointing elsewhere
        let (resolved, resolved_dir) = match (
            tokio_fs::canonicalize(&candidate).await,
            tokio_fs::canonicalize(&self.backup_dir).await,
        ) {
            (Ok(resolved), Ok(resolved_dir)) => (resolved, resolved_dir),
            _ => return Err(BackupError::NotFound),
        };

        if !resolved.starts_with(&resolved_dir) {
            warn!(name, "Path escape attempt");
            return Err(BackupError::NotFound);
        }

        match tokio_fs::metadata(&resolved).await {
            Ok(metadata) if metadata.is_file() => Ok(resolved),
            _ => Err(BackupError::NotFound),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.admit(name)?;

        match tokio_fs::remove_file(self.backup_dir.join(name)).await {
            Ok(()) => {
                info!(name, "Deleted old backup");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackupError::Io(e)),
        }
    }

    fn source_path(&self) -> PathBuf {
        self.source_path.clone()
    }

    fn backup_dir(&self) -> PathBuf {
        self.backup_dir.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::{tempdir, TempDir};
    use tokio::io::AsyncWriteExt;

    // Helper function to create a test file with some content
    async fn create_test_file(path: &Path, content: &str) -> std::io::Result<()> {
        let mut file = tokio_fs::File::create(path).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn store_in(temp_dir: &TempDir) -> LocalSnapshotStore {
        let config = BackupConfig {
            backup_dir: temp_dir.path().join("backups"),
            database_path: temp_dir.path().join("live.db"),
            ..BackupConfig::default()
        };
        LocalSnapshotStore::new(&config, Arc::new(SnapshotNaming::new("homeregistry")))
    }

    #[tokio::test]
    async fn test_create_copies_live_file() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(&temp_dir);
        create_test_file(&store.source_path(), "live data").await.unwrap();

        let snapshot = store.create(at(15, 12)).await.unwrap();

        assert_eq!(snapshot.name, "homeregistry_backup_20240315_120000.db");
        assert_eq!(snapshot.captured_at, at(15, 12));
        assert_eq!(snapshot.size_bytes, "live data".len() as u64);

        let copied = tokio_fs::read_to_string(store.backup_dir().join(&snapshot.name))
            .await
            .unwrap();
        assert_eq!(copied, "live data");

        // Source untouched
        let source = tokio_fs::read_to_string(store.source_path()).await.unwrap();
        assert_eq!(source, "live data");
    }

    #[tokio::test]
    async fn test_create_without_source_leaves_nothing_behind() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(&temp_dir);
        tokio_fs::create_dir_all(store.backup_dir()).await.unwrap();

        let result = store.create(at(15, 12)).await;

        assert!(matches!(result, Err(BackupError::SourceNotFound(_))));
        let mut entries = tokio_fs::read_dir(store.backup_dir()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_newest_first() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(&temp_dir);
        create_test_file(&store.source_path(), "x").await.unwrap();

        store.create(at(10, 2)).await.unwrap();
        store.create(at(15, 12)).await.unwrap();
        store.create(at(12, 8)).await.unwrap();

        let dir = store.backup_dir();
        create_test_file(&dir.join("README.txt"), "unrelated").await.unwrap();
        create_test_file(&dir.join(".homeregistry_backup_20240316_000000.db.partial"), "half")
            .await
            .unwrap();
        create_test_file(&dir.join("homeregistry_backup_20240399_000000.db"), "bad date")
            .await
            .unwrap();
        tokio_fs::create_dir(dir.join("homeregistry_backup_20240301_000000.db"))
            .await
            .unwrap();

        let snapshots = store.list().await.unwrap();
        let times: Vec<_> = snapshots.iter().map(|s| s.captured_at).collect();

        assert_eq!(times, vec![at(15, 12), at(12, 8), at(10, 2)]);
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_empty() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(&temp_dir);

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_existing_snapshot() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(&temp_dir);
        create_test_file(&store.source_path(), "x").await.unwrap();
        let snapshot = store.create(at(15, 12)).await.unwrap();

        let path = store.resolve(&snapshot.name).await.unwrap();

        assert_eq!(path.file_name().unwrap(), snapshot.name.as_str());
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn test_resolve_rejects_traversal() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(&temp_dir);
        tokio_fs::create_dir_all(store.backup_dir()).await.unwrap();

        // A real file one level up with a valid-looking name
        create_test_file(
            &temp_dir.path().join("homeregistry_backup_20240315_120000.db"),
            "outside",
        )
        .await
        .unwrap();

        for name in [
            "../../etc/passwd",
            "backup/../../secret.db",
            "../homeregistry_backup_20240315_120000.db",
            "..\\homeregistry_backup_20240315_120000.db",
            "/etc/passwd",
            "..",
            "",
        ] {
            assert!(
                matches!(store.resolve(name).await, Err(BackupError::NotFound)),
                "{name} should not resolve"
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_unknown_and_invalid_names_are_not_found() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(&temp_dir);
        tokio_fs::create_dir_all(store.backup_dir()).await.unwrap();
        create_test_file(&store.backup_dir().join("notes.txt"), "x").await.unwrap();

        assert!(matches!(store.resolve("notes.txt").await, Err(BackupError::NotFound)));
        assert!(matches!(
            store.resolve("homeregistry_backup_20240315_120000.db").await,
            Err(BackupError::NotFound)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_rejects_symlink_out_of_directory() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(&temp_dir);
        tokio_fs::create_dir_all(store.backup_dir()).await.unwrap();

        let secret = temp_dir.path().join("secret.db");
        create_test_file(&secret, "secret").await.unwrap();
        tokio_fs::symlink(&secret, store.backup_dir().join("homeregistry_backup_20240315_120000.db"))
            .await
            .unwrap();

        assert!(matches!(
            store.resolve("homeregistry_backup_20240315_120000.db").await,
            Err(BackupError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(&temp_dir);
        create_test_file(&store.source_path(), "x").await.unwrap();
        let snapshot = store.create(at(15, 12)).await.unwrap();

        store.delete(&snapshot.name).await.unwrap();
        store.delete(&snapshot.name).await.unwrap();

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_refuses_unsafe_names() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(&temp_dir);
        let outside = temp_dir.path().join("live.db");
        create_test_file(&outside, "keep me").await.unwrap();

        let result = store.delete("../live.db").await;

        assert!(matches!(result, Err(BackupError::InvalidName(_))));
        assert!(outside.exists());
    }
}
