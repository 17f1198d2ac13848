//! Audit Log Writer: one immutable entry per terminal Run.

use autopilot_db::models::audit::CreateAuditLog;
use autopilot_db::models::run::Run;
use serde_json::json;

use crate::store::AuditWriter;

/// Build the audit entry for a terminal Run.
pub fn entry_for(run: &Run) -> CreateAuditLog {
    CreateAuditLog {
        run_id: run.id,
        tenant_id: run.tenant_id.clone(),
        entity_id: run.entity_id.clone(),
        trigger_type: run.trigger_type.clone(),
        rule_id: run.rule_id.clone(),
        status_id: run.status_id,
        reason: run.reason_skipped.clone(),
        error: run.error.clone(),
        fingerprint_hash: run.fingerprint_hash.clone(),
        before_snapshot: run.before_snapshot.clone(),
        after_snapshot: run.after_snapshot.clone(),
        details_json: Some(json!({
            "action": run.action,
            "attempts": run.attempts,
            "error_details": run.error_details,
            "retry_of_run_id": run.retry_of_run_id,
            "payload_digest": run.payload_digest,
            "claimed_by": run.claimed_by,
        })),
    }
}

/// Append the entry for `run`.
///
/// The Run row is already terminal when this is called, so a failed append
/// is logged rather than surfaced: the outcome itself is not lost.
pub async fn record(writer: &dyn AuditWriter, run: &Run) {
    if let Err(e) = writer.append(&entry_for(run)).await {
        tracing::error!(
            run_id = run.id,
            tenant_id = %run.tenant_id,
            error = %e,
            "Failed to append audit entry",
        );
    }
}
