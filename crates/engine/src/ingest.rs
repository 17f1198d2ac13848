//! Trigger ingestion: the HTTP entry point and the bus listener both funnel
//! raw events through the Trigger Adapter into the [`Evaluator`].

use autopilot_core::error::CoreError;
use autopilot_core::trigger::{self, RawTriggerEvent, TriggerEvent, TriggerType};
use autopilot_core::types::DbId;
use autopilot_events::{DomainEvent, EventBus};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::gate::{Evaluator, GateOutcome};

/// Reason reported when the Trigger Adapter rejects an event.
pub const MALFORMED_EVENT: &str = "malformed_event";

/// Reply to a trigger submission. `accepted` means the gate ran, not that
/// any content was generated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<DbId>,
}

impl IngestResponse {
    pub fn from_outcome(outcome: &GateOutcome) -> Self {
        Self {
            accepted: true,
            reason: outcome.decision.skip_reason().map(|r| r.to_string()),
            detail: None,
            run_id: Some(outcome.run.id),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(MALFORMED_EVENT.to_string()),
            detail: Some(detail.into()),
            run_id: None,
        }
    }
}

/// Normalize and evaluate one raw trigger.
pub async fn ingest(
    evaluator: &Evaluator,
    raw: &RawTriggerEvent,
) -> Result<IngestResponse, EngineError> {
    let event = match trigger::normalize(raw) {
        Ok(event) => event,
        Err(CoreError::MalformedEvent(detail)) => {
            tracing::debug!(detail = %detail, "Rejected malformed trigger");
            return Ok(IngestResponse::malformed(detail));
        }
        Err(e) => return Err(e.into()),
    };
    let outcome = evaluator.evaluate(&event).await?;
    Ok(IngestResponse::from_outcome(&outcome))
}

/// Feeds catalog events published on the bus into the gate.
///
/// Failures never propagate back to the publisher, so a broken automation
/// cannot fail the sync that triggered it. A trigger the gate cannot decide
/// is retried, then recorded as a failed Run.
pub struct TriggerListener {
    evaluator: Evaluator,
}

impl TriggerListener {
    pub fn new(evaluator: Evaluator) -> Self {
        Self { evaluator }
    }

    /// Subscribe to `bus` and evaluate trigger events until cancelled.
    pub async fn run(self, bus: &EventBus, cancel: CancellationToken) {
        let mut rx = bus.subscribe();
        tracing::info!("Trigger listener started");

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Trigger listener lagged, events dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            self.handle(&event).await;
        }
        tracing::info!("Trigger listener stopping");
    }

    /// Evaluate one bus event if it is a trigger source; ignore the rest.
    pub async fn handle(&self, event: &DomainEvent) -> Option<GateOutcome> {
        TriggerType::from_source_event(&event.event_type)?;

        let mut payload = event.payload.clone();
        if let Some(map) = payload.as_object_mut() {
            if let Some(tenant_id) = &event.tenant_id {
                map.entry("tenant_id")
                    .or_insert_with(|| tenant_id.clone().into());
            }
            if let Some(entity_id) = &event.entity_id {
                map.entry("entity_id")
                    .or_insert_with(|| entity_id.clone().into());
            }
        }

        let trigger = match trigger::normalize_source_event(
            &event.event_type,
            &payload,
            event.timestamp,
        ) {
            Ok(trigger) => trigger,
            Err(e) => {
                tracing::warn!(event_type = %event.event_type, error = %e, "Ignoring malformed trigger event");
                return None;
            }
        };

        self.evaluate_with_retry(&trigger).await
    }

    /// Evaluate, retrying transient failures. When the gate still cannot
    /// decide, the trigger is recorded as a failed Run so the outcome is
    /// auditable and the next trigger re-arms the key; `None` is returned.
    async fn evaluate_with_retry(&self, trigger: &TriggerEvent) -> Option<GateOutcome> {
        let config = self.evaluator.config();
        let max_attempts = config.trigger_max_attempts.max(1);
        let mut attempt = 0;

        let error = loop {
            attempt += 1;
            match self.evaluator.evaluate(trigger).await {
                Ok(outcome) => return Some(outcome),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::warn!(
                        tenant_id = %trigger.tenant_id,
                        entity_id = %trigger.entity_id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Trigger evaluation failed, retrying",
                    );
                    tokio::time::sleep(config.trigger_retry_delay).await;
                }
                Err(e) => break e,
            }
        };

        tracing::error!(
            trigger_type = %trigger.trigger_type,
            tenant_id = %trigger.tenant_id,
            entity_id = %trigger.entity_id,
            attempts = attempt,
            error = %error,
            "Trigger evaluation failed",
        );

        if error.is_upstream() {
            if let Err(e) = self
                .evaluator
                .record_unavailable(trigger, &error.to_string())
                .await
            {
                tracing::error!(
                    tenant_id = %trigger.tenant_id,
                    entity_id = %trigger.entity_id,
                    error = %e,
                    "Could not record undecided trigger",
                );
            }
        }
        None
    }
}
