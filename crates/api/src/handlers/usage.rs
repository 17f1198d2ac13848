//! Usage and aggregate signals derived from Run history.

use autopilot_core::types::{start_of_utc_day, Timestamp};
use autopilot_db::repositories::RunRepo;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use super::settings::find_rule;
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub tenant_id: String,
    pub rule_id: String,
    /// `SUCCEEDED` Runs completed since `day_start`.
    pub count_today: i64,
    pub day_start: Timestamp,
}

/// GET /api/v1/tenants/{tenant_id}/automation/usage/{rule_id}
///
/// Successful Runs for the current UTC day, the number the daily cap is
/// checked against.
pub async fn get_usage(
    State(state): State<AppState>,
    Path((tenant_id, rule_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    find_rule(&state, &rule_id)?;

    let day_start = start_of_utc_day(Utc::now());
    let count_today =
        RunRepo::count_succeeded_since(&state.pool, &tenant_id, &rule_id, day_start).await?;

    Ok(Json(DataResponse {
        data: UsageResponse {
            tenant_id,
            rule_id,
            count_today,
            day_start,
        },
    }))
}

/// GET /api/v1/tenants/{tenant_id}/automation/summary
///
/// Pending, running, failed-awaiting-retry and today's terminal counts.
pub async fn get_summary(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let summary = RunRepo::summary(&state.pool, &tenant_id, start_of_utc_day(Utc::now())).await?;
    Ok(Json(DataResponse { data: summary }))
}
