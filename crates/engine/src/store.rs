//! Persistence seams used by the gate, executor and background tasks.
//!
//! [`RunStore`] exposes exactly the conditional operations the engine
//! relies on for correctness. The Postgres implementations delegate to the
//! repositories in `autopilot-db`; the `testing` module (feature
//! `test-util`) provides in-memory doubles with the same compare-and-swap
//! semantics.

use std::sync::Arc;

use async_trait::async_trait;
use autopilot_core::collaborators::{CollaboratorError, SettingsSource};
use autopilot_core::reasons::{FailureKind, SkipReason};
use autopilot_core::rules::RuleCatalog;
use autopilot_core::trigger::TriggerType;
use autopilot_core::types::{DbId, Timestamp};
use autopilot_db::models::audit::CreateAuditLog;
use autopilot_db::models::run::{Completion, NewRun, Run};
use autopilot_db::repositories::{AuditLogRepo, RunRepo, SettingRepo};
use autopilot_db::DbPool;

use crate::error::EngineError;

/// Run persistence with database-enforced coordination.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a `QUEUED` Run unless the key already has a live one.
    async fn try_enqueue(&self, run: &NewRun) -> Result<Option<Run>, EngineError>;

    /// Insert a terminal `SKIPPED` Run for a gate-time decision.
    async fn record_skip(&self, run: &NewRun, reason: SkipReason) -> Result<Run, EngineError>;

    /// Insert a terminal `FAILED` Run for a trigger the gate could not
    /// decide.
    async fn record_failure(
        &self,
        run: &NewRun,
        kind: FailureKind,
        detail: &str,
    ) -> Result<Run, EngineError>;

    async fn latest_settled(
        &self,
        tenant_id: &str,
        entity_id: &str,
        trigger_type: TriggerType,
    ) -> Result<Option<Run>, EngineError>;

    async fn count_succeeded_since(
        &self,
        tenant_id: &str,
        rule_id: &str,
        since: Timestamp,
    ) -> Result<i64, EngineError>;

    /// `QUEUED -> RUNNING`. `None` when someone else got there first.
    async fn claim(&self, run_id: DbId, worker: &str) -> Result<Option<Run>, EngineError>;

    async fn complete(&self, run_id: DbId, completion: &Completion) -> Result<bool, EngineError>;

    async fn skip_running(
        &self,
        run_id: DbId,
        reason: SkipReason,
        completion: &Completion,
    ) -> Result<bool, EngineError>;

    async fn fail_running(
        &self,
        run_id: DbId,
        kind: FailureKind,
        detail: &str,
        completion: &Completion,
    ) -> Result<bool, EngineError>;

    async fn find(&self, run_id: DbId) -> Result<Option<Run>, EngineError>;

    async fn list_redeliverable(
        &self,
        older_than: Timestamp,
        limit: i64,
    ) -> Result<Vec<DbId>, EngineError>;

    async fn fail_stuck(&self, claimed_before: Timestamp) -> Result<Vec<Run>, EngineError>;
}

/// Append-only audit sink.
#[async_trait]
pub trait AuditWriter: Send + Sync {
    async fn append(&self, entry: &CreateAuditLog) -> Result<(), EngineError>;
}

// ---------------------------------------------------------------------------
// Postgres implementations
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgRunStore {
    pool: DbPool,
}

impl PgRunStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn try_enqueue(&self, run: &NewRun) -> Result<Option<Run>, EngineError> {
        Ok(RunRepo::try_enqueue(&self.pool, run).await?)
    }

    async fn record_skip(&self, run: &NewRun, reason: SkipReason) -> Result<Run, EngineError> {
        Ok(RunRepo::record_skip(&self.pool, run, reason).await?)
    }

    async fn record_failure(
        &self,
        run: &NewRun,
        kind: FailureKind,
        detail: &str,
    ) -> Result<Run, EngineError> {
        Ok(RunRepo::record_failure(&self.pool, run, kind, detail).await?)
    }

    async fn latest_settled(
        &self,
        tenant_id: &str,
        entity_id: &str,
        trigger_type: TriggerType,
    ) -> Result<Option<Run>, EngineError> {
        Ok(RunRepo::latest_settled(&self.pool, tenant_id, entity_id, trigger_type).await?)
    }

    async fn count_succeeded_since(
        &self,
        tenant_id: &str,
        rule_id: &str,
        since: Timestamp,
    ) -> Result<i64, EngineError> {
        Ok(RunRepo::count_succeeded_since(&self.pool, tenant_id, rule_id, since).await?)
    }

    async fn claim(&self, run_id: DbId, worker: &str) -> Result<Option<Run>, EngineError> {
        Ok(RunRepo::claim(&self.pool, run_id, worker).await?)
    }

    async fn complete(&self, run_id: DbId, completion: &Completion) -> Result<bool, EngineError> {
        Ok(RunRepo::complete(&self.pool, run_id, completion).await?)
    }

    async fn skip_running(
        &self,
        run_id: DbId,
        reason: SkipReason,
        completion: &Completion,
    ) -> Result<bool, EngineError> {
        Ok(RunRepo::skip_running(&self.pool, run_id, reason, completion).await?)
    }

    async fn fail_running(
        &self,
        run_id: DbId,
        kind: FailureKind,
        detail: &str,
        completion: &Completion,
    ) -> Result<bool, EngineError> {
        Ok(RunRepo::fail_running(&self.pool, run_id, kind, detail, completion).await?)
    }

    async fn find(&self, run_id: DbId) -> Result<Option<Run>, EngineError> {
        Ok(RunRepo::find_by_id(&self.pool, run_id).await?)
    }

    async fn list_redeliverable(
        &self,
        older_than: Timestamp,
        limit: i64,
    ) -> Result<Vec<DbId>, EngineError> {
        Ok(RunRepo::list_redeliverable(&self.pool, older_than, limit).await?)
    }

    async fn fail_stuck(&self, claimed_before: Timestamp) -> Result<Vec<Run>, EngineError> {
        Ok(RunRepo::fail_stuck(&self.pool, claimed_before).await?)
    }
}

#[derive(Clone)]
pub struct PgAuditWriter {
    pool: DbPool,
}

impl PgAuditWriter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditWriter for PgAuditWriter {
    async fn append(&self, entry: &CreateAuditLog) -> Result<(), EngineError> {
        AuditLogRepo::append(&self.pool, entry).await?;
        Ok(())
    }
}

/// Tenant settings read from `automation_settings`, lazily created with the
/// rule's default on first read.
#[derive(Clone)]
pub struct PgSettings {
    pool: DbPool,
    rules: Arc<RuleCatalog>,
}

impl PgSettings {
    pub fn new(pool: DbPool, rules: Arc<RuleCatalog>) -> Self {
        Self { pool, rules }
    }
}

#[async_trait]
impl SettingsSource for PgSettings {
    async fn is_enabled(&self, tenant_id: &str, rule_id: &str) -> Result<bool, CollaboratorError> {
        let default = self
            .rules
            .get(rule_id)
            .map(|rule| rule.enabled_by_default)
            .unwrap_or(false);
        SettingRepo::get_or_create(&self.pool, tenant_id, rule_id, default)
            .await
            .map(|setting| setting.enabled)
            .map_err(|e| CollaboratorError::Unavailable {
                service: "settings",
                message: e.to_string(),
            })
    }
}
