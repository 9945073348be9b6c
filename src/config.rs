use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Tier windows for the retention policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionConfig {
    /// Keep every snapshot younger than this many hours
    pub hourly_hours: u32,
    /// Keep one snapshot per day for this many days
    pub daily_days: u32,
    /// Keep one snapshot per week for this many weeks
    pub weekly_weeks: u32,
    /// Keep one snapshot per month for this many (31-day) months
    pub monthly_months: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            hourly_hours: 24,
            daily_days: 7,
            weekly_weeks: 4,
            monthly_months: 12,
        }
    }
}

/// SMTP settings used only when a backup fails
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
    pub to: String,
    pub use_tls: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            user: String::new(),
            password: String::new(),
            from: String::new(),
            to: String::new(),
            use_tls: true,
        }
    }
}

/// Configuration for the backup subsystem
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Whether scheduled backups run at all
    pub enabled: bool,
    /// Hours between scheduled backups, never less than one
    pub interval_hours: u64,
    /// Directory holding snapshot files
    pub backup_dir: PathBuf,
    /// The live database file that gets snapshotted
    pub database_path: PathBuf,
    /// Prefix for snapshot filenames
    pub app_name: String,
    pub retention: RetentionConfig,
    pub email: EmailConfig,
    /// Listen address for the admin HTTP surface
    pub bind_addr: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: 1,
            backup_dir: PathBuf::from("/data/backups"),
            database_path: PathBuf::from("/data/homeregistry.db"),
            app_name: String::from("homeregistry"),
            retention: RetentionConfig::default(),
            email: EmailConfig::default(),
            bind_addr: String::from("0.0.0.0:8080"),
        }
    }
}

impl BackupConfig {
    /// Load backup configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Missing or unparseable values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let retention = RetentionConfig {
            hourly_hours: parse_or(&lookup, "BACKUP_RETENTION_HOURLY", defaults.retention.hourly_hours),
            daily_days: parse_or(&lookup, "BACKUP_RETENTION_DAILY", defaults.retention.daily_days),
            weekly_weeks: parse_or(&lookup, "BACKUP_RETENTION_WEEKLY", defaults.retention.weekly_weeks),
            monthly_months: parse_or(&lookup, "BACKUP_RETENTION_MONTHLY", defaults.retention.monthly_months),
        };

        let email = EmailConfig {
            host: lookup("EMAIL_HOST").unwrap_or(defaults.email.host),
            port: parse_or(&lookup, "EMAIL_PORT", defaults.email.port),
            user: lookup("EMAIL_USER").unwrap_or(defaults.email.user),
            password: lookup("EMAIL_PASSWORD").unwrap_or(defaults.email.password),
            from: lookup("EMAIL_FROM").unwrap_or(defaults.email.from),
            to: lookup("EMAIL_TO").unwrap_or(defaults.email.to),
            use_tls: flag_or(&lookup, "EMAIL_USE_TLS", defaults.email.use_tls),
        };

        Self {
            enabled: flag_or(&lookup, "BACKUP_ENABLED", defaults.enabled),
            interval_hours: parse_or(&lookup, "BACKUP_INTERVAL_HOURS", defaults.interval_hours).max(1),
            backup_dir: lookup("BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.backup_dir),
            database_path: lookup("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            app_name: lookup("BACKUP_APP_NAME")
                .filter(|name| !name.is_empty())
                .unwrap_or(defaults.app_name),
            retention,
            email,
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
        }
    }

    /// Ensure the backup directory exists
    pub fn ensure_backup_dir(&self) -> std::io::Result<()> {
        if !self.backup_dir.exists() {
            std::fs::create_dir_all(&self.backup_dir)?;
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag_or<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> BackupConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BackupConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = load(&[]);

        assert!(config.enabled);
        assert_eq!(config.interval_hours, 1);
        assert_eq!(config.backup_dir, PathBuf::from("/data/backups"));
        assert_eq!(config.app_name, "homeregistry");
        assert_eq!(config.retention, RetentionConfig::default());
        assert_eq!(config.email.port, 587);
        assert!(config.email.use_tls);
    }

    #[test]
    fn test_values_from_lookup() {
        let config = load(&[
            ("BACKUP_ENABLED", "false"),
            ("BACKUP_INTERVAL_HOURS", "6"),
            ("BACKUP_DIR", "/tmp/snaps"),
            ("DATABASE_PATH", "/tmp/live.db"),
            ("BACKUP_RETENTION_HOURLY", "12"),
            ("BACKUP_RETENTION_DAILY", "3"),
            ("BACKUP_RETENTION_WEEKLY", "2"),
            ("BACKUP_RETENTION_MONTHLY", "6"),
            ("EMAIL_HOST", "smtp.example.com"),
            ("EMAIL_PORT", "2525"),
            ("EMAIL_USE_TLS", "no"),
        ]);

        assert!(!config.enabled);
        assert_eq!(config.interval_hours, 6);
        assert_eq!(config.backup_dir, PathBuf::from("/tmp/snaps"));
        assert_eq!(config.database_path, PathBuf::from("/tmp/live.db"));
        assert_eq!(
            config.retention,
            RetentionConfig {
                hourly_hours: 12,
                daily_days: 3,
                weekly_weeks: 2,
                monthly_months: 6,
            }
        );
        assert_eq!(config.email.host, "smtp.example.com");
        assert_eq!(config.email.port, 2525);
        assert!(!config.email.use_tls);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = load(&[
            ("BACKUP_INTERVAL_HOURS", "0"),
            ("BACKUP_RETENTION_DAILY", "-4"),
            ("EMAIL_PORT", "smtp"),
            ("BACKUP_APP_NAME", ""),
        ]);

        assert_eq!(config.interval_hours, 1);
        assert_eq!(config.retention.daily_days, 7);
        assert_eq!(config.email.port, 587);
        assert_eq!(config.app_name, "homeregistry");
    }

    #[test]
    fn test_ensure_backup_dir_creates_missing_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = BackupConfig {
            backup_dir: temp_dir.path().join("nested").join("backups"),
            ..BackupConfig::default()
        };

        config.ensure_backup_dir().unwrap();
        assert!(config.backup_dir.is_dir());
    }
}
