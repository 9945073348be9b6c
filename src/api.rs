//! Admin HTTP endpoints for the backup subsystem

use std::sync::Arc;
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use crate::config::BackupConfig;
use crate::database::backup::{BackupManager, BackupReport, CleanupReport};
use crate::database::backup_naming::SnapshotNaming;
use crate::database::scheduler::BackupScheduler;
use crate::database::status::{self, BackupStatus};
use crate::database::storage::{Snapshot, SnapshotStorage};
use crate::database::BackupError;

const SQLITE_MIME: &str = "application/x-sqlite3";

// Shared state for the backup routes
pub struct AppState {
    pub config: BackupConfig,
    pub naming: Arc<SnapshotNaming>,
    pub manager: Arc<BackupManager>,
    pub scheduler: Arc<BackupScheduler>,
}

/// Error response; never says why a download was refused
pub struct ApiError(BackupError);

impl From<BackupError> for ApiError {
    fn from(error: BackupError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            BackupError::NotFound | BackupError::InvalidName(_) => (
                StatusCode::NOT_FOUND,
                String::from("Backup not found or invalid filename"),
            ),
            BackupError::AlreadyRunning => (StatusCode::CONFLICT, self.0.to_string()),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Serialize)]
struct CreateResponse {
    success: bool,
    message: &'static str,
    backup: BackupReport,
}

#[derive(Serialize)]
struct ListResponse {
    backups: Vec<Snapshot>,
    count: usize,
}

#[derive(Serialize)]
struct CleanupResponse {
    success: bool,
    message: &'static str,
    result: CleanupReport,
}

/// Routes under `/api/backup`
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/backup/create", post(create_handler))
        .route("/api/backup/list", get(list_handler))
        .route("/api/backup/download/{filename}", get(download_handler))
        .route("/api/backup/download-current", get(download_current_handler))
        .route("/api/backup/cleanup", delete(cleanup_handler))
        .route("/api/backup/status", get(status_handler))
        .with_state(state)
}

// Handler for a manual backup
async fn create_handler(State(state): State<Arc<AppState>>) -> Result<Json<CreateResponse>, ApiError> {
    info!("Manual backup triggered");

    let report = state.scheduler.run_now().await?;
    Ok(Json(CreateResponse {
        success: true,
        message: "Backup created successfully",
        backup: report,
    }))
}

async fn list_handler(State(state): State<Arc<AppState>>) -> Result<Json<ListResponse>, ApiError> {
    let backups = state.manager.storage().list().await?;
    Ok(Json(ListResponse {
        count: backups.len(),
        backups,
    }))
}

async fn download_handler(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    info!(filename = %filename, "Backup download requested");

    let path = state.manager.storage().resolve(&filename).await.map_err(|e| {
        warn!(filename = %filename, "Invalid backup request");
        e
    })?;

    attachment(&path, &filename).await
}

// Handler for downloading the live database under a timestamped name
async fn download_current_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let path = state.manager.storage().source_path();
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(BackupError::NotFound.into());
    }

    let filename = state
        .naming
        .current_download_name(state.manager.clock().now());
    attachment(&path, &filename).await
}

async fn cleanup_handler(State(state): State<Arc<AppState>>) -> Result<Json<CleanupResponse>, ApiError> {
    info!("Manual cleanup triggered");

    let result = state.manager.cleanup().await?;
    Ok(Json(CleanupResponse {
        success: true,
        message: "Cleanup completed",
        result,
    }))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Result<Json<BackupStatus>, ApiError> {
    let status = status::report(&state.config, &state.manager).await?;
    Ok(Json(status))
}

/// Stream a file as a download
async fn attachment(path: &std::path::Path, filename: &str) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(path).await.map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to open download");
        BackupError::NotFound
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, SQLITE_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}
