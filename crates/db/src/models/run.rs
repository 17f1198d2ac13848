//! Automation Run models and DTOs.

use autopilot_core::error::CoreError;
use autopilot_core::gate::{PriorOutcome, PriorRun};
use autopilot_core::reasons::{FailureKind, SkipReason};
use autopilot_core::trigger::{TriggerEvent, TriggerType};
use autopilot_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{RunStatus, StatusId};

/// A row from the `automation_runs` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Run {
    pub id: DbId,
    pub tenant_id: String,
    pub entity_id: String,
    pub trigger_type: String,
    pub rule_id: String,
    pub action: String,
    pub status_id: StatusId,
    pub fingerprint_hash: Option<String>,
    pub payload_digest: Option<String>,
    pub reason_skipped: Option<String>,
    pub before_snapshot: Option<serde_json::Value>,
    pub after_snapshot: Option<serde_json::Value>,
    pub error: Option<String>,
    pub error_details: Option<String>,
    pub attempts: i16,
    pub retry_of_run_id: Option<DbId>,
    pub claimed_by: Option<String>,
    pub occurred_at: Timestamp,
    pub created_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl Run {
    pub fn status(&self) -> Option<RunStatus> {
        RunStatus::from_id(self.status_id)
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        self.reason_skipped.as_deref().and_then(|r| r.parse().ok())
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.error.as_deref().and_then(|e| e.parse().ok())
    }

    /// View of this Run for the idempotency check. `None` for live Runs.
    pub fn as_prior(&self) -> Option<PriorRun> {
        let outcome = match self.status()? {
            RunStatus::Succeeded => PriorOutcome::Succeeded,
            RunStatus::Failed => PriorOutcome::Failed,
            RunStatus::Skipped => PriorOutcome::Skipped(self.skip_reason()?),
            RunStatus::Queued | RunStatus::Running => return None,
        };
        Some(PriorRun {
            run_id: self.id,
            outcome,
            fingerprint_hash: self.fingerprint_hash.clone(),
        })
    }
}

/// Data for a new Run row (queued or gate-skipped).
#[derive(Debug, Clone, PartialEq)]
pub struct NewRun {
    pub tenant_id: String,
    pub entity_id: String,
    pub trigger_type: TriggerType,
    pub rule_id: String,
    pub action: String,
    pub fingerprint_hash: Option<String>,
    pub payload_digest: Option<String>,
    pub occurred_at: Timestamp,
    pub retry_of_run_id: Option<DbId>,
}

impl NewRun {
    pub fn from_event(event: &TriggerEvent, rule_id: &str, action: &str) -> Self {
        Self {
            tenant_id: event.tenant_id.clone(),
            entity_id: event.entity_id.clone(),
            trigger_type: event.trigger_type,
            rule_id: rule_id.to_string(),
            action: action.to_string(),
            fingerprint_hash: None,
            payload_digest: event.payload_digest.clone(),
            occurred_at: event.occurred_at,
            retry_of_run_id: None,
        }
    }
}

/// Snapshots and attempt count written with a terminal transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub before_snapshot: Option<serde_json::Value>,
    pub after_snapshot: Option<serde_json::Value>,
    pub attempts: i16,
}

/// Query parameters for `GET /api/v1/runs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunListQuery {
    pub tenant_id: Option<String>,
    pub entity_id: Option<String>,
    pub trigger_type: Option<String>,
    /// Status name, case-insensitive (e.g. `failed`, `SKIPPED`).
    pub status: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<Timestamp>,
    /// Inclusive upper bound on `created_at`.
    pub to: Option<Timestamp>,
    /// Maximum number of results. Defaults to 50, capped at 500.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl RunListQuery {
    /// Validate string filters into a typed [`RunFilter`].
    pub fn to_filter(&self) -> Result<RunFilter, CoreError> {
        let trigger_type = self
            .trigger_type
            .as_deref()
            .map(str::parse::<TriggerType>)
            .transpose()?;
        let status = self
            .status
            .as_deref()
            .map(|name| {
                RunStatus::from_name(name)
                    .ok_or_else(|| CoreError::Validation(format!("Unknown run status '{name}'")))
            })
            .transpose()?;
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(CoreError::Validation("'from' must not be after 'to'".into()));
            }
        }
        Ok(RunFilter {
            tenant_id: self.tenant_id.clone(),
            entity_id: self.entity_id.clone(),
            trigger_type,
            status,
            from: self.from,
            to: self.to,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

/// Typed Run filter used by the repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunFilter {
    pub tenant_id: Option<String>,
    pub entity_id: Option<String>,
    pub trigger_type: Option<TriggerType>,
    pub status: Option<RunStatus>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Aggregate signals for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize)]
pub struct RunSummary {
    /// Runs waiting for a worker.
    pub pending: i64,
    pub running: i64,
    /// Keys whose latest settled Run failed; they retry on the next trigger.
    pub failed_awaiting_retry: i64,
    pub succeeded_today: i64,
    pub skipped_today: i64,
}
