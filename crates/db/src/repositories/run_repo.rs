//! Repository for the `automation_runs` table.
//!
//! Every status change is a conditional update keyed on the expected
//! current status, so concurrent gates, workers and the stuck-run sweep
//! can race freely: exactly one of them wins each transition.

use autopilot_core::reasons::{FailureKind, SkipReason};
use autopilot_core::trigger::TriggerType;
use autopilot_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::run::{Completion, NewRun, Run, RunFilter, RunSummary};
use crate::models::status::RunStatus;

/// Column list for `automation_runs` queries.
const COLUMNS: &str = "\
    id, tenant_id, entity_id, trigger_type, rule_id, action, status_id, \
    fingerprint_hash, payload_digest, reason_skipped, \
    before_snapshot, after_snapshot, error, error_details, attempts, \
    retry_of_run_id, claimed_by, occurred_at, created_at, claimed_at, \
    completed_at, updated_at";

/// Column list for INSERT.
const INSERT_COLUMNS: &str = "\
    tenant_id, entity_id, trigger_type, rule_id, action, status_id, \
    fingerprint_hash, payload_digest, occurred_at, retry_of_run_id";

/// Maximum page size for run listing.
const MAX_LIMIT: i64 = 500;

/// Default page size for run listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides the conditional persistence operations behind the engine.
pub struct RunRepo;

impl RunRepo {
    /// Insert guard: create a `QUEUED` Run unless the key already has a
    /// live one.
    ///
    /// Relies on the partial unique index `uq_automation_runs_live_key`.
    /// Returns `None` when another Run for the same
    /// `(tenant_id, entity_id, trigger_type)` is queued or running.
    pub async fn try_enqueue(pool: &PgPool, input: &NewRun) -> Result<Option<Run>, sqlx::Error> {
        let query = format!(
            "INSERT INTO automation_runs ({INSERT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (tenant_id, entity_id, trigger_type) WHERE status_id IN (1, 2) \
             DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Run>(&query)
            .bind(&input.tenant_id)
            .bind(&input.entity_id)
            .bind(input.trigger_type.as_str())
            .bind(&input.rule_id)
            .bind(&input.action)
            .bind(RunStatus::Queued.id())
            .bind(&input.fingerprint_hash)
            .bind(&input.payload_digest)
            .bind(input.occurred_at)
            .bind(input.retry_of_run_id)
            .fetch_optional(pool)
            .await
    }

    /// Record a gate-time skip as a terminal Run.
    pub async fn record_skip(
        pool: &PgPool,
        input: &NewRun,
        reason: SkipReason,
    ) -> Result<Run, sqlx::Error> {
        let query = format!(
            "INSERT INTO automation_runs ({INSERT_COLUMNS}, reason_skipped, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW()) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Run>(&query)
            .bind(&input.tenant_id)
            .bind(&input.entity_id)
            .bind(input.trigger_type.as_str())
            .bind(&input.rule_id)
            .bind(&input.action)
            .bind(RunStatus::Skipped.id())
            .bind(&input.fingerprint_hash)
            .bind(&input.payload_digest)
            .bind(input.occurred_at)
            .bind(input.retry_of_run_id)
            .bind(reason.as_str())
            .fetch_one(pool)
            .await
    }

    /// Record a trigger the gate could not decide as a terminal `FAILED`
    /// Run, so the next trigger for the key re-arms it.
    pub async fn record_failure(
        pool: &PgPool,
        input: &NewRun,
        kind: FailureKind,
        detail: &str,
    ) -> Result<Run, sqlx::Error> {
        let query = format!(
            "INSERT INTO automation_runs \
                 ({INSERT_COLUMNS}, error, error_details, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW()) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Run>(&query)
            .bind(&input.tenant_id)
            .bind(&input.entity_id)
            .bind(input.trigger_type.as_str())
            .bind(&input.rule_id)
            .bind(&input.action)
            .bind(RunStatus::Failed.id())
            .bind(&input.fingerprint_hash)
            .bind(&input.payload_digest)
            .bind(input.occurred_at)
            .bind(input.retry_of_run_id)
            .bind(kind.as_str())
            .bind(detail)
            .fetch_one(pool)
            .await
    }

    /// The most recent Run for a key that settled its fingerprint: a
    /// success, a failure, or a skip whose reason is a content verdict.
    pub async fn latest_settled(
        pool: &PgPool,
        tenant_id: &str,
        entity_id: &str,
        trigger_type: TriggerType,
    ) -> Result<Option<Run>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM automation_runs \
             WHERE tenant_id = $1 AND entity_id = $2 AND trigger_type = $3 \
               AND (status_id IN ($4, $5) \
                    OR (status_id = $6 AND reason_skipped = ANY($7))) \
             ORDER BY id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, Run>(&query)
            .bind(tenant_id)
            .bind(entity_id)
            .bind(trigger_type.as_str())
            .bind(RunStatus::Succeeded.id())
            .bind(RunStatus::Failed.id())
            .bind(RunStatus::Skipped.id())
            .bind(SkipReason::settling_reasons())
            .fetch_optional(pool)
            .await
    }

    /// Count `SUCCEEDED` Runs for a tenant/rule completed at or after `since`.
    pub async fn count_succeeded_since(
        pool: &PgPool,
        tenant_id: &str,
        rule_id: &str,
        since: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*)::BIGINT FROM automation_runs \
             WHERE tenant_id = $1 AND rule_id = $2 AND status_id = $3 \
               AND completed_at >= $4",
        )
        .bind(tenant_id)
        .bind(rule_id)
        .bind(RunStatus::Succeeded.id())
        .bind(since)
        .fetch_one(pool)
        .await
    }

    /// Find a Run by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Run>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM automation_runs WHERE id = $1");
        sqlx::query_as::<_, Run>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Claim a queued Run: `QUEUED -> RUNNING` compare-and-swap.
    ///
    /// Returns `None` if the Run is no longer queued, meaning another worker
    /// already claimed it (or it never existed).
    pub async fn claim(
        pool: &PgPool,
        id: DbId,
        worker: &str,
    ) -> Result<Option<Run>, sqlx::Error> {
        let query = format!(
            "UPDATE automation_runs \
             SET status_id = $2, claimed_at = NOW(), claimed_by = $3 \
             WHERE id = $1 AND status_id = $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Run>(&query)
            .bind(id)
            .bind(RunStatus::Running.id())
            .bind(worker)
            .bind(RunStatus::Queued.id())
            .fetch_optional(pool)
            .await
    }

    /// `RUNNING -> SUCCEEDED`. Returns `false` if the Run was no longer
    /// running (e.g. swept to `FAILED(timeout)`).
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        completion: &Completion,
    ) -> Result<bool, sqlx::Error> {
        Self::finish(pool, id, RunStatus::Succeeded, None, None, None, completion).await
    }

    /// `RUNNING -> SKIPPED(reason)`.
    pub async fn skip_running(
        pool: &PgPool,
        id: DbId,
        reason: SkipReason,
        completion: &Completion,
    ) -> Result<bool, sqlx::Error> {
        Self::finish(
            pool,
            id,
            RunStatus::Skipped,
            Some(reason.as_str()),
            None,
            None,
            completion,
        )
        .await
    }

    /// `RUNNING -> FAILED(error)`.
    pub async fn fail_running(
        pool: &PgPool,
        id: DbId,
        kind: FailureKind,
        detail: &str,
        completion: &Completion,
    ) -> Result<bool, sqlx::Error> {
        Self::finish(
            pool,
            id,
            RunStatus::Failed,
            None,
            Some(kind.as_str()),
            Some(detail),
            completion,
        )
        .await
    }

    async fn finish(
        pool: &PgPool,
        id: DbId,
        status: RunStatus,
        reason: Option<&str>,
        error: Option<&str>,
        error_details: Option<&str>,
        completion: &Completion,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE automation_runs \
             SET status_id = $2, reason_skipped = $3, error = $4, error_details = $5, \
                 before_snapshot = $6, after_snapshot = $7, attempts = $8, \
                 completed_at = NOW() \
             WHERE id = $1 AND status_id = $9",
        )
        .bind(id)
        .bind(status.id())
        .bind(reason)
        .bind(error)
        .bind(error_details)
        .bind(&completion.before_snapshot)
        .bind(&completion.after_snapshot)
        .bind(completion.attempts)
        .bind(RunStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// IDs of `QUEUED` Runs created before `older_than`, oldest first.
    ///
    /// Used by the queue poller to redeliver work whose in-process message
    /// was lost.
    pub async fn list_redeliverable(
        pool: &PgPool,
        older_than: Timestamp,
        limit: i64,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM automation_runs \
             WHERE status_id = $1 AND created_at < $2 \
             ORDER BY created_at ASC \
             LIMIT $3",
        )
        .bind(RunStatus::Queued.id())
        .bind(older_than)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Force `RUNNING` Runs claimed before `claimed_before` to
    /// `FAILED(timeout)` so the re-arm path can admit a retry.
    pub async fn fail_stuck(
        pool: &PgPool,
        claimed_before: Timestamp,
    ) -> Result<Vec<Run>, sqlx::Error> {
        let query = format!(
            "UPDATE automation_runs \
             SET status_id = $1, error = $2, \
                 error_details = 'Run exceeded the operational timeout', \
                 completed_at = NOW() \
             WHERE status_id = $3 AND claimed_at < $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Run>(&query)
            .bind(RunStatus::Failed.id())
            .bind(FailureKind::Timeout.as_str())
            .bind(RunStatus::Running.id())
            .bind(claimed_before)
            .fetch_all(pool)
            .await
    }

    /// List Runs matching the filter, newest first.
    pub async fn list(pool: &PgPool, filter: &RunFilter) -> Result<Vec<Run>, sqlx::Error> {
        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = filter.offset.unwrap_or(0).max(0);

        let (where_clause, bind_idx) = build_run_filter(filter);

        let query = format!(
            "SELECT {COLUMNS} FROM automation_runs \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, Run>(&query);
        if let Some(tenant_id) = &filter.tenant_id {
            q = q.bind(tenant_id);
        }
        if let Some(entity_id) = &filter.entity_id {
            q = q.bind(entity_id);
        }
        if let Some(trigger_type) = filter.trigger_type {
            q = q.bind(trigger_type.as_str());
        }
        if let Some(status) = filter.status {
            q = q.bind(status.id());
        }
        if let Some(from) = filter.from {
            q = q.bind(from);
        }
        if let Some(to) = filter.to {
            q = q.bind(to);
        }

        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Count Runs matching the filter (for pagination metadata).
    pub async fn count(pool: &PgPool, filter: &RunFilter) -> Result<i64, sqlx::Error> {
        let (where_clause, _) = build_run_filter(filter);
        let query = format!("SELECT COUNT(*)::BIGINT FROM automation_runs {where_clause}");

        let mut q = sqlx::query_scalar::<_, i64>(&query);
        if let Some(tenant_id) = &filter.tenant_id {
            q = q.bind(tenant_id);
        }
        if let Some(entity_id) = &filter.entity_id {
            q = q.bind(entity_id);
        }
        if let Some(trigger_type) = filter.trigger_type {
            q = q.bind(trigger_type.as_str());
        }
        if let Some(status) = filter.status {
            q = q.bind(status.id());
        }
        if let Some(from) = filter.from {
            q = q.bind(from);
        }
        if let Some(to) = filter.to {
            q = q.bind(to);
        }
        q.fetch_one(pool).await
    }

    /// Aggregate status counts for one tenant. `day_start` bounds the
    /// "today" counters.
    pub async fn summary(
        pool: &PgPool,
        tenant_id: &str,
        day_start: Timestamp,
    ) -> Result<RunSummary, sqlx::Error> {
        sqlx::query_as::<_, RunSummary>(
            "SELECT \
                 COUNT(*) FILTER (WHERE status_id = 1)::BIGINT AS pending, \
                 COUNT(*) FILTER (WHERE status_id = 2)::BIGINT AS running, \
                 ( \
                     SELECT COUNT(*) FROM ( \
                         SELECT DISTINCT ON (entity_id, trigger_type) status_id \
                         FROM automation_runs \
                         WHERE tenant_id = $1 \
                           AND (status_id IN (1, 2, 3, 5) \
                                OR (status_id = 4 AND reason_skipped = ANY($3))) \
                         ORDER BY entity_id, trigger_type, id DESC \
                     ) latest \
                     WHERE latest.status_id = 5 \
                 )::BIGINT AS failed_awaiting_retry, \
                 COUNT(*) FILTER (WHERE status_id = 3 AND completed_at >= $2)::BIGINT \
                     AS succeeded_today, \
                 COUNT(*) FILTER (WHERE status_id = 4 AND completed_at >= $2)::BIGINT \
                     AS skipped_today \
             FROM automation_runs \
             WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .bind(day_start)
        .bind(SkipReason::settling_reasons())
        .fetch_one(pool)
        .await
    }
}

/// Build the WHERE clause for a [`RunFilter`]. Returns the clause and the
/// next free bind index. Bind order: tenant, entity, trigger, status, from, to.
fn build_run_filter(filter: &RunFilter) -> (String, u32) {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_idx: u32 = 1;

    if filter.tenant_id.is_some() {
        conditions.push(format!("tenant_id = ${bind_idx}"));
        bind_idx += 1;
    }
    if filter.entity_id.is_some() {
        conditions.push(format!("entity_id = ${bind_idx}"));
        bind_idx += 1;
    }
    if filter.trigger_type.is_some() {
        conditions.push(format!("trigger_type = ${bind_idx}"));
        bind_idx += 1;
    }
    if filter.status.is_some() {
        conditions.push(format!("status_id = ${bind_idx}"));
        bind_idx += 1;
    }
    if filter.from.is_some() {
        conditions.push(format!("created_at >= ${bind_idx}"));
        bind_idx += 1;
    }
    if filter.to.is_some() {
        conditions.push(format!("created_at <= ${bind_idx}"));
        bind_idx += 1;
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (where_clause, bind_idx)
}
