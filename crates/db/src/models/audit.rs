//! Automation audit log models. Entries are immutable (no `updated_at`).

use autopilot_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// A single audit entry.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct AutomationAuditLog {
    pub id: DbId,
    pub run_id: DbId,
    pub tenant_id: String,
    pub entity_id: String,
    pub trigger_type: String,
    pub rule_id: String,
    pub status_id: StatusId,
    pub reason: Option<String>,
    pub error: Option<String>,
    pub fingerprint_hash: Option<String>,
    pub before_snapshot: Option<serde_json::Value>,
    pub after_snapshot: Option<serde_json::Value>,
    pub details_json: Option<serde_json::Value>,
    pub integrity_hash: String,
    pub created_at: Timestamp,
}

impl AutomationAuditLog {
    /// Canonical string hashed into the chain.
    pub fn canonical_data(&self) -> String {
        CreateAuditLog::canonical(
            self.run_id,
            self.status_id,
            self.reason.as_deref(),
            self.error.as_deref(),
            self.fingerprint_hash.as_deref(),
            self.before_snapshot.as_ref(),
            self.after_snapshot.as_ref(),
        )
    }
}

/// DTO for appending an audit entry. The integrity hash is computed by the
/// repository inside the append transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateAuditLog {
    pub run_id: DbId,
    pub tenant_id: String,
    pub entity_id: String,
    pub trigger_type: String,
    pub rule_id: String,
    pub status_id: StatusId,
    pub reason: Option<String>,
    pub error: Option<String>,
    pub fingerprint_hash: Option<String>,
    pub before_snapshot: Option<serde_json::Value>,
    pub after_snapshot: Option<serde_json::Value>,
    pub details_json: Option<serde_json::Value>,
}

impl CreateAuditLog {
    pub fn canonical_data(&self) -> String {
        Self::canonical(
            self.run_id,
            self.status_id,
            self.reason.as_deref(),
            self.error.as_deref(),
            self.fingerprint_hash.as_deref(),
            self.before_snapshot.as_ref(),
            self.after_snapshot.as_ref(),
        )
    }

    fn canonical(
        run_id: DbId,
        status_id: StatusId,
        reason: Option<&str>,
        error: Option<&str>,
        fingerprint_hash: Option<&str>,
        before: Option<&serde_json::Value>,
        after: Option<&serde_json::Value>,
    ) -> String {
        serde_json::json!({
            "run_id": run_id,
            "status_id": status_id,
            "reason": reason,
            "error": error,
            "fingerprint_hash": fingerprint_hash,
            "before": before,
            "after": after,
        })
        .to_string()
    }
}

/// Filter parameters for audit queries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub run_id: Option<DbId>,
    pub entity_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
