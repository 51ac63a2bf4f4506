//! Queue control. Routes sit behind `require_auth` + `require_admin`.

use axum::{extract::State, Extension, Json};
use serde_json::{json, Value};

use crate::auth::middleware::AuthUser;
use crate::error::AppResult;
use crate::services::queue::{self, BatchSummary, QueueStatus};
use crate::AppState;

pub async fn queue_status(State(state): State<AppState>) -> AppResult<Json<QueueStatus>> {
    Ok(Json(state.queue.status().await?))
}

pub async fn pause_queue(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
) -> AppResult<Json<QueueStatus>> {
    state.queue.control().pause();
    tracing::info!(admin_id = %admin.id, "Report queue paused");
    Ok(Json(state.queue.status().await?))
}

pub async fn resume_queue(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
) -> AppResult<Json<QueueStatus>> {
    state.queue.control().resume();
    tracing::info!(admin_id = %admin.id, "Report queue resumed");
    Ok(Json(state.queue.status().await?))
}

/// Deletes pending jobs only; running and finished jobs are kept.
pub async fn clear_queue(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let deleted = queue::clear_pending(&state.db).await?;
    tracing::warn!(admin_id = %admin.id, deleted = deleted, "Pending report jobs cleared");
    Ok(Json(json!({ "deleted": deleted })))
}

/// Runs one batch now, even while paused.
pub async fn process_queue(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
) -> AppResult<Json<BatchSummary>> {
    tracing::info!(admin_id = %admin.id, "Manual report batch triggered");
    Ok(Json(state.queue.process_batch().await?))
}
