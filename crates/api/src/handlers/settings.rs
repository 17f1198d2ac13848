//! Handlers for per-tenant automation toggles.

use autopilot_core::rules::AutomationRule;
use autopilot_db::models::setting::UpdateSetting;
use autopilot_db::repositories::SettingRepo;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

pub(crate) fn find_rule<'a>(state: &'a AppState, rule_id: &str) -> AppResult<&'a AutomationRule> {
    state
        .rules
        .get(rule_id)
        .ok_or_else(|| AppError::NotFound(format!("Rule '{rule_id}' not found")))
}

/// GET /api/v1/tenants/{tenant_id}/automation/settings
///
/// One setting per catalog rule. Rows that do not exist yet are created
/// with the rule's default, so a new tenant sees everything OFF.
pub async fn list_settings(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let mut settings = Vec::with_capacity(state.rules.rules().len());
    for rule in state.rules.rules() {
        let setting = SettingRepo::get_or_create(
            &state.pool,
            &tenant_id,
            &rule.rule_id,
            rule.enabled_by_default,
        )
        .await?;
        settings.push(setting);
    }
    Ok(Json(DataResponse { data: settings }))
}

/// PUT /api/v1/tenants/{tenant_id}/automation/settings/{rule_id}
///
/// Toggle one rule for a tenant. Returns 404 for a rule the catalog does
/// not define.
pub async fn update_setting(
    State(state): State<AppState>,
    Path((tenant_id, rule_id)): Path<(String, String)>,
    Json(input): Json<UpdateSetting>,
) -> AppResult<impl IntoResponse> {
    find_rule(&state, &rule_id)?;

    let setting = SettingRepo::set(&state.pool, &tenant_id, &rule_id, input.enabled).await?;

    tracing::info!(
        tenant_id = %tenant_id,
        rule_id = %rule_id,
        enabled = setting.enabled,
        "Automation setting updated",
    );

    Ok(Json(DataResponse { data: setting }))
}
