//! Background scheduling of backup cycles
//!
//! A single spawned task fires `BackupManager::run_once` on a fixed period.
//! A failed cycle is logged and alerted on, and the next tick still fires.
//! A fire that finds another run in progress is skipped without an alert.

use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::database::backup::{BackupManager, BackupReport};
use crate::database::{BackupError, Result};
use crate::notify::Notifier;

/// Lifecycle of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Stopped,
    Started,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs backups periodically in the background
pub struct BackupScheduler {
    manager: Arc<BackupManager>,
    notifier: Option<Arc<dyn Notifier>>,
    enabled: bool,
    period: Duration,
    running: Mutex<Option<Running>>,
}

impl BackupScheduler {
    /// Scheduler firing every `interval_hours` hours (at least one)
    pub fn new(
        manager: Arc<BackupManager>,
        notifier: Option<Arc<dyn Notifier>>,
        enabled: bool,
        interval_hours: u64,
    ) -> Self {
        Self::with_period(
            manager,
            notifier,
            enabled,
            Duration::from_secs(interval_hours.max(1) * 60 * 60),
        )
    }

    /// Scheduler with an arbitrary period
    pub fn with_period(
        manager: Arc<BackupManager>,
        notifier: Option<Arc<dyn Notifier>>,
        enabled: bool,
        period: Duration,
    ) -> Self {
        Self {
            manager,
            notifier,
            enabled,
            period,
            running: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> SchedulerState {
        match self.running.lock().await.as_ref() {
            Some(_) => SchedulerState::Started,
            None => SchedulerState::Stopped,
        }
    }

    /// Start firing backups; a no-op when disabled or already started.
    ///
    /// The first backup fires one full period after start.
    pub async fn start(&self) {
        if !self.enabled {
            info!("Backup scheduler disabled via configuration");
            return;
        }

        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("Backup scheduler already running");
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let manager = Arc::clone(&self.manager);
        let notifier = self.notifier.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                // Outside the select so stop() never interrupts a run
                let _ = execute(&manager, notifier.as_deref(), "scheduled").await;
            }
        });

        *running = Some(Running { cancel, handle });
        info!(period_secs = period.as_secs(), "Backup scheduler started");
    }

    /// Cancel future fires. A run already in progress is left to finish.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        running.cancel.cancel();
        // Dropping the handle detaches the task; it exits after any in-flight run
        drop(running.handle);
        info!("Backup scheduler stopped");
    }

    /// Run one backup right now, whether or not the scheduler is started.
    /// Failures go back to the caller and are not alerted on.
    pub async fn run_now(&self) -> Result<BackupReport> {
        execute(&self.manager, None, "manual").await
    }
}

/// One guarded cycle: run it, and alert on failure
async fn execute(
    manager: &BackupManager,
    notifier: Option<&dyn Notifier>,
    trigger: &str,
) -> Result<BackupReport> {
    info!(trigger, "Starting backup");

    let result = manager.run_once().await;
    match &result {
        Ok(report) => info!(
            trigger,
            name = %report.snapshot.name,
            size_bytes = report.snapshot.size_bytes,
            "Backup completed"
        ),
        Err(BackupError::AlreadyRunning) => {
            info!(trigger, "Backup skipped, another run is in progress");
        }
        Err(e) => {
            error!(trigger, error = %e, "Backup failed");
            send_failure_alert(notifier, &e.to_string()).await;
        }
    }

    result
}

async fn send_failure_alert(notifier: Option<&dyn Notifier>, message: &str) {
    match notifier {
        Some(notifier) if notifier.is_configured() => {
            if let Err(e) = notifier.send_failure_alert(message).await {
                error!(error = %e, "Failed to send backup failure alert");
            }
        }
        _ => debug!("Email not configured, skipping failure alert"),
    }
}
