use dotenv::dotenv;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod clock;
mod config;
mod database;
mod notify;

use clock::{Clock, SystemClock};
use config::BackupConfig;
use database::backup::BackupManager;
use database::backup_naming::SnapshotNaming;
use database::scheduler::BackupScheduler;
use database::storage::LocalSnapshotStore;
use notify::{EmailNotifier, Notifier};

#[tokio::main]
async fn main() {
    // Load .env file
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = BackupConfig::from_env();
    if let Err(e) = config.ensure_backup_dir() {
        warn!(dir = %config.backup_dir.display(), error = %e, "Could not create backup directory");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let naming = Arc::new(SnapshotNaming::new(&config.app_name));
    let store = Arc::new(LocalSnapshotStore::new(&config, naming.clone()));
    let manager = Arc::new(BackupManager::new(store, config.retention, clock.clone()));

    let notifier: Arc<dyn Notifier> = Arc::new(EmailNotifier::new(
        config.email.clone(),
        &config.app_name,
        clock,
    ));
    if !notifier.is_configured() {
        info!("Email not configured, backup failure alerts are disabled");
    }

    let scheduler = Arc::new(BackupScheduler::new(
        manager.clone(),
        Some(notifier),
        config.enabled,
        config.interval_hours,
    ));
    scheduler.start().await;
    info!(state = ?scheduler.state().await, "Backup scheduler ready");

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(api::AppState {
        config,
        naming,
        manager,
        scheduler: scheduler.clone(),
    });
    let app = api::router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %bind_addr, error = %e, "Failed to bind");
            scheduler.stop().await;
            return;
        }
    };

    info!(addr = %bind_addr, "Server starting");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    if let Err(e) = served {
        error!(error = %e, "Server error");
    }

    scheduler.stop().await;
    info!("Shut down");
}
