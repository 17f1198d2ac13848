//! Run lifecycle events published on the bus.

use autopilot_core::run_events::{RUN_FAILED, RUN_QUEUED, RUN_SKIPPED, RUN_SUCCEEDED};
use autopilot_db::models::run::Run;
use autopilot_db::models::status::RunStatus;
use autopilot_events::{DomainEvent, EventBus};
use serde_json::json;

/// Event name for a Run's current status. Running Runs are not announced.
pub fn event_type_for(status: RunStatus) -> Option<&'static str> {
    match status {
        RunStatus::Queued => Some(RUN_QUEUED),
        RunStatus::Succeeded => Some(RUN_SUCCEEDED),
        RunStatus::Skipped => Some(RUN_SKIPPED),
        RunStatus::Failed => Some(RUN_FAILED),
        RunStatus::Running => None,
    }
}

pub fn publish(bus: &EventBus, run: &Run) {
    let Some(event_type) = run.status().and_then(event_type_for) else {
        return;
    };
    bus.publish(
        DomainEvent::new(event_type)
            .with_entity(run.tenant_id.clone(), run.entity_id.clone())
            .with_run(run.id)
            .with_payload(json!({
                "trigger_type": run.trigger_type,
                "rule_id": run.rule_id,
                "reason": run.reason_skipped,
                "error": run.error,
            })),
    );
}
