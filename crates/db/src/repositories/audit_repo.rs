//! Repository for the `automation_audit_logs` table.
//!
//! The chain is per tenant. Appends serialize on a transaction-scoped
//! advisory lock keyed by tenant so two writers never chain from the same
//! predecessor.

use autopilot_core::audit::compute_integrity_hash;
use autopilot_core::types::DbId;
use sqlx::PgPool;

use crate::models::audit::{AuditQuery, AutomationAuditLog, CreateAuditLog};

/// Column list for `automation_audit_logs` SELECT queries.
const COLUMNS: &str = "\
    id, run_id, tenant_id, entity_id, trigger_type, rule_id, status_id, \
    reason, error, fingerprint_hash, before_snapshot, after_snapshot, \
    details_json, integrity_hash, created_at";

/// Column list for INSERT (excludes `id` and `created_at`).
const INSERT_COLUMNS: &str = "\
    run_id, tenant_id, entity_id, trigger_type, rule_id, status_id, \
    reason, error, fingerprint_hash, before_snapshot, after_snapshot, \
    details_json, integrity_hash";

/// Provides append and query operations for the audit chain.
pub struct AuditLogRepo;

impl AuditLogRepo {
    /// Append one entry, chaining its hash from the tenant's last entry.
    pub async fn append(
        pool: &PgPool,
        entry: &CreateAuditLog,
    ) -> Result<AutomationAuditLog, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&entry.tenant_id)
            .execute(&mut *tx)
            .await?;

        let prev_hash = sqlx::query_scalar::<_, String>(
            "SELECT integrity_hash FROM automation_audit_logs \
             WHERE tenant_id = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(&entry.tenant_id)
        .fetch_optional(&mut *tx)
        .await?;

        let integrity_hash = compute_integrity_hash(prev_hash.as_deref(), &entry.canonical_data());

        let query = format!(
            "INSERT INTO automation_audit_logs ({INSERT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, AutomationAuditLog>(&query)
            .bind(entry.run_id)
            .bind(&entry.tenant_id)
            .bind(&entry.entity_id)
            .bind(&entry.trigger_type)
            .bind(&entry.rule_id)
            .bind(entry.status_id)
            .bind(&entry.reason)
            .bind(&entry.error)
            .bind(&entry.fingerprint_hash)
            .bind(&entry.before_snapshot)
            .bind(&entry.after_snapshot)
            .bind(&entry.details_json)
            .bind(&integrity_hash)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }

    /// Query a tenant's entries, newest first.
    pub async fn query(
        pool: &PgPool,
        tenant_id: &str,
        params: &AuditQuery,
    ) -> Result<Vec<AutomationAuditLog>, sqlx::Error> {
        let limit = params.limit.unwrap_or(50).clamp(1, 500);
        let offset = params.offset.unwrap_or(0).max(0);

        let mut conditions = vec!["tenant_id = $1".to_string()];
        let mut bind_idx: u32 = 2;
        if params.run_id.is_some() {
            conditions.push(format!("run_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.entity_id.is_some() {
            conditions.push(format!("entity_id = ${bind_idx}"));
            bind_idx += 1;
        }

        let query = format!(
            "SELECT {COLUMNS} FROM automation_audit_logs \
             WHERE {} \
             ORDER BY id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            conditions.join(" AND "),
            bind_idx + 1
        );

        let mut q = sqlx::query_as::<_, AutomationAuditLog>(&query).bind(tenant_id);
        if let Some(run_id) = params.run_id {
            q = q.bind(run_id);
        }
        if let Some(entity_id) = &params.entity_id {
            q = q.bind(entity_id);
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// All entries for one Run, oldest first.
    pub async fn list_for_run(
        pool: &PgPool,
        run_id: DbId,
    ) -> Result<Vec<AutomationAuditLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM automation_audit_logs WHERE run_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, AutomationAuditLog>(&query)
            .bind(run_id)
            .fetch_all(pool)
            .await
    }

    /// The whole chain for a tenant in insertion order, for verification.
    pub async fn chain_for_tenant(
        pool: &PgPool,
        tenant_id: &str,
    ) -> Result<Vec<AutomationAuditLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM automation_audit_logs WHERE tenant_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, AutomationAuditLog>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }
}
