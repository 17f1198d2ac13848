//! Repository for the `automation_settings` table.

use sqlx::PgPool;

use crate::models::setting::AutomationSetting;

const COLUMNS: &str = "id, tenant_id, rule_id, enabled, created_at, updated_at";

/// Provides lazy-create and toggle operations for tenant settings.
pub struct SettingRepo;

impl SettingRepo {
    /// Read a setting, creating it with `default_enabled` on first access.
    ///
    /// Concurrent first reads race on `uq_automation_settings_tenant_rule`;
    /// the loser's insert is a no-op and it reads the winner's row.
    pub async fn get_or_create(
        pool: &PgPool,
        tenant_id: &str,
        rule_id: &str,
        default_enabled: bool,
    ) -> Result<AutomationSetting, sqlx::Error> {
        let query = format!(
            "INSERT INTO automation_settings (tenant_id, rule_id, enabled) \
             VALUES ($1, $2, $3) \
             ON CONFLICT ON CONSTRAINT uq_automation_settings_tenant_rule DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, AutomationSetting>(&query)
            .bind(tenant_id)
            .bind(rule_id)
            .bind(default_enabled)
            .fetch_optional(pool)
            .await?;
        if let Some(row) = inserted {
            return Ok(row);
        }

        let query = format!(
            "SELECT {COLUMNS} FROM automation_settings WHERE tenant_id = $1 AND rule_id = $2"
        );
        sqlx::query_as::<_, AutomationSetting>(&query)
            .bind(tenant_id)
            .bind(rule_id)
            .fetch_one(pool)
            .await
    }

    /// Set the toggle, creating the row if needed.
    pub async fn set(
        pool: &PgPool,
        tenant_id: &str,
        rule_id: &str,
        enabled: bool,
    ) -> Result<AutomationSetting, sqlx::Error> {
        let query = format!(
            "INSERT INTO automation_settings (tenant_id, rule_id, enabled) \
             VALUES ($1, $2, $3) \
             ON CONFLICT ON CONSTRAINT uq_automation_settings_tenant_rule \
             DO UPDATE SET enabled = EXCLUDED.enabled \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AutomationSetting>(&query)
            .bind(tenant_id)
            .bind(rule_id)
            .bind(enabled)
            .fetch_one(pool)
            .await
    }

    /// All settings rows that exist for a tenant.
    pub async fn list_for_tenant(
        pool: &PgPool,
        tenant_id: &str,
    ) -> Result<Vec<AutomationSetting>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM automation_settings WHERE tenant_id = $1 ORDER BY rule_id"
        );
        sqlx::query_as::<_, AutomationSetting>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }
}
