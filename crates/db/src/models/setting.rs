//! Per-tenant automation setting models.

use autopilot_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `automation_settings` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct AutomationSetting {
    pub id: DbId,
    pub tenant_id: String,
    pub rule_id: String,
    pub enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for `PUT /api/v1/tenants/{tenant_id}/automation/settings/{rule_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSetting {
    pub enabled: bool,
}
