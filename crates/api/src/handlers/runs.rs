//! Handlers for the read-only Run query surface.

use autopilot_core::error::CoreError;
use autopilot_core::types::DbId;
use autopilot_db::models::run::{Run, RunListQuery};
use autopilot_db::repositories::{AuditLogRepo, RunRepo};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::response::{DataResponse, PageResponse};
use crate::state::AppState;

async fn find_run(pool: &sqlx::PgPool, run_id: DbId) -> AppResult<Run> {
    RunRepo::find_by_id(pool, run_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Run",
            id: run_id,
        }))
}

/// GET /api/v1/runs
///
/// List Runs, newest first. Filters: `tenant_id`, `entity_id`,
/// `trigger_type`, `status`, `from`, `to`, plus `limit` / `offset`.
pub async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<RunListQuery>,
) -> AppResult<impl IntoResponse> {
    let filter = params.to_filter()?;
    let runs = RunRepo::list(&state.pool, &filter).await?;
    let total = RunRepo::count(&state.pool, &filter).await?;

    Ok(Json(PageResponse { data: runs, total }))
}

/// GET /api/v1/runs/{id}
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let run = find_run(&state.pool, run_id).await?;
    Ok(Json(DataResponse { data: run }))
}

/// GET /api/v1/runs/{id}/audit
///
/// Audit entries written for one Run, oldest first.
pub async fn get_run_audit(
    State(state): State<AppState>,
    Path(run_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    find_run(&state.pool, run_id).await?;
    let entries = AuditLogRepo::list_for_run(&state.pool, run_id).await?;
    Ok(Json(DataResponse { data: entries }))
}
