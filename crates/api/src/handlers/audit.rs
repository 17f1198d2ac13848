//! Handlers for the automation audit trail.

use autopilot_core::audit::verify_chain;
use autopilot_core::types::DbId;
use autopilot_db::models::audit::AuditQuery;
use autopilot_db::repositories::AuditLogRepo;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AuditVerification {
    pub tenant_id: String,
    pub entries_checked: usize,
    pub intact: bool,
    /// Id of the first entry whose stored hash does not match.
    pub first_broken_id: Option<DbId>,
}

/// GET /api/v1/tenants/{tenant_id}/automation/audit
///
/// Newest first. Filters: `run_id`, `entity_id`, `limit`, `offset`.
pub async fn list_audit(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(params): Query<AuditQuery>,
) -> AppResult<impl IntoResponse> {
    let entries = AuditLogRepo::query(&state.pool, &tenant_id, &params).await?;
    Ok(Json(DataResponse { data: entries }))
}

/// GET /api/v1/tenants/{tenant_id}/automation/audit/verify
///
/// Recompute the tenant's hash chain from the first entry.
pub async fn verify_audit(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let entries = AuditLogRepo::chain_for_tenant(&state.pool, &tenant_id).await?;
    let canonical: Vec<String> = entries.iter().map(|e| e.canonical_data()).collect();

    let result = verify_chain(
        None,
        canonical
            .iter()
            .zip(&entries)
            .map(|(data, entry)| (data.as_str(), entry.integrity_hash.as_str())),
    );

    if let Some(idx) = result.first_broken_at {
        tracing::error!(tenant_id = %tenant_id, entry_index = idx, "Audit chain broken");
    }

    Ok(Json(DataResponse {
        data: AuditVerification {
            tenant_id,
            entries_checked: result.entries_checked,
            intact: result.is_intact(),
            first_broken_id: result
                .first_broken_at
                .and_then(|idx| entries.get(idx))
                .map(|e| e.id),
        },
    }))
}
