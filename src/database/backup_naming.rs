//! Backup naming module for generating and parsing timestamp-based snapshot names
//!
//! Snapshot names look like `<app>_backup_YYYYMMDD_HHMMSS.db`. The name is the
//! filename on disk and the capture time it encodes is the only timestamp the
//! retention policy trusts.

use chrono::NaiveDateTime;

/// Fixed file extension of snapshot artifacts
pub const SNAPSHOT_EXTENSION: &str = "db";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
// YYYYMMDD_HHMMSS
const TIMESTAMP_LEN: usize = 15;

/// Service for generating and recognising snapshot names
#[derive(Debug, Clone)]
pub struct SnapshotNaming {
    /// Application identifier used as the filename prefix
    app_name: String,
}

impl SnapshotNaming {
    /// Create a naming service for the given application prefix
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
        }
    }

    fn prefix(&self) -> String {
        format!("{}_backup_", self.app_name)
    }

    /// Snapshot name for a capture instant, at second resolution
    pub fn format(&self, captured_at: NaiveDateTime) -> String {
        format!(
            "{}{}.{}",
            self.prefix(),
            captured_at.format(TIMESTAMP_FORMAT),
            SNAPSHOT_EXTENSION
        )
    }

    /// Capture instant encoded in a snapshot name.
    ///
    /// Returns `None` unless the name is exactly what `format` would produce
    /// for the parsed instant.
    pub fn parse(&self, name: &str) -> Option<NaiveDateTime> {
        let stamp = name
            .strip_prefix(self.prefix().as_str())?
            .strip_suffix(SNAPSHOT_EXTENSION)?
            .strip_suffix('.')?;

        if stamp.len() != TIMESTAMP_LEN
            || !stamp
                .char_indices()
                .all(|(i, c)| if i == 8 { c == '_' } else { c.is_ascii_digit() })
        {
            return None;
        }

        let captured_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;

        // Round-trip guard
        if self.format(captured_at) != name {
            return None;
        }

        Some(captured_at)
    }

    /// Admission gate for every filename read from storage or user input
    pub fn is_valid(&self, filename: &str) -> bool {
        filename.starts_with(self.prefix().as_str())
            && filename.ends_with(&format!(".{}", SNAPSHOT_EXTENSION))
            && self.parse(filename).is_some()
    }

    /// Download name for a copy of the live database taken at `now`
    pub fn current_download_name(&self, now: NaiveDateTime) -> String {
        format!(
            "{}_current_{}.{}",
            self.app_name,
            now.format(TIMESTAMP_FORMAT),
            SNAPSHOT_EXTENSION
        )
    }
}
