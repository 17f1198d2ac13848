//! Evaluation Gate orchestration.
//!
//! Gathers facts lazily in check order so an early skip never pays for a
//! later lookup (a disabled setting never reaches the entitlement service),
//! then either records a gate-time skip or admits a `QUEUED` Run through
//! the insert guard.

use autopilot_core::content::{fingerprint, has_sufficient_data, EntityContent};
use autopilot_core::error::CoreError;
use autopilot_core::gate::{
    check_daily_cap, check_entitlement, check_idempotency, check_setting, check_sufficiency,
    rearm_source, Decision,
};
use autopilot_core::reasons::{FailureKind, SkipReason};
use autopilot_core::rules::AutomationRule;
use autopilot_core::trigger::TriggerEvent;
use autopilot_core::types::start_of_utc_day;
use autopilot_db::models::run::{NewRun, Run};
use chrono::Utc;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::queue::RunQueue;
use crate::{audit, lifecycle};

/// What the gate decided and the Run row that records it.
#[derive(Debug, Clone, Serialize)]
pub struct GateOutcome {
    pub decision: Decision,
    pub run: Run,
}

enum Verdict {
    Admit,
    Skip(SkipReason),
}

/// Turns normalized triggers into Run rows.
#[derive(Clone)]
pub struct Evaluator {
    ctx: EngineContext,
    queue: RunQueue,
}

impl Evaluator {
    pub fn new(ctx: EngineContext, queue: RunQueue) -> Self {
        Self { ctx, queue }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    /// Decide `proceed | skip(reason)` for one trigger and persist the
    /// decision.
    pub async fn evaluate(&self, event: &TriggerEvent) -> Result<GateOutcome, EngineError> {
        let rule = self.rule_for(event)?;
        let mut new_run = NewRun::from_event(event, &rule.rule_id, &rule.target_surface);

        match self.check(event, rule, &mut new_run).await? {
            Verdict::Skip(reason) => self.skip(&new_run, reason).await,
            Verdict::Admit => match self.ctx.store.try_enqueue(&new_run).await? {
                Some(run) => self.admitted(run).await,
                None => self.skip(&new_run, SkipReason::AlreadyInFlight).await,
            },
        }
    }

    /// Record a trigger the gate could not decide as a terminal
    /// `FAILED(gate_unavailable)` Run with its audit entry. The Run is not
    /// live, so the next trigger for the key re-arms it.
    pub async fn record_unavailable(
        &self,
        event: &TriggerEvent,
        detail: &str,
    ) -> Result<Run, EngineError> {
        let rule = self.rule_for(event)?;
        let new_run = NewRun::from_event(event, &rule.rule_id, &rule.target_surface);
        let run = self
            .ctx
            .store
            .record_failure(&new_run, FailureKind::GateUnavailable, detail)
            .await?;

        tracing::warn!(
            run_id = run.id,
            tenant_id = %run.tenant_id,
            entity_id = %run.entity_id,
            trigger_type = %run.trigger_type,
            rule_id = %run.rule_id,
            detail,
            "Trigger recorded as failed, gate could not decide",
        );

        audit::record(self.ctx.audit.as_ref(), &run).await;
        lifecycle::publish(&self.ctx.bus, &run);
        Ok(run)
    }

    fn rule_for(&self, event: &TriggerEvent) -> Result<&AutomationRule, EngineError> {
        self.ctx.rules.for_trigger(event.trigger_type).ok_or_else(|| {
            CoreError::Internal(format!("no rule configured for {}", event.trigger_type)).into()
        })
    }

    async fn check(
        &self,
        event: &TriggerEvent,
        rule: &AutomationRule,
        new_run: &mut NewRun,
    ) -> Result<Verdict, EngineError> {
        let tenant_id = event.tenant_id.as_str();
        let rule_id = rule.rule_id.as_str();

        let enabled = self.ctx.settings.is_enabled(tenant_id, rule_id).await?;
        if let Err(reason) = check_setting(enabled) {
            return Ok(Verdict::Skip(reason));
        }

        let entitlement = self.ctx.entitlements.entitlement(tenant_id, rule_id).await?;
        if let Err(reason) = check_entitlement(entitlement.allowed) {
            return Ok(Verdict::Skip(reason));
        }

        let cap = entitlement.daily_cap.unwrap_or(rule.daily_cap);
        let succeeded_today = self
            .ctx
            .store
            .count_succeeded_since(tenant_id, rule_id, start_of_utc_day(Utc::now()))
            .await?;
        if let Err(reason) = check_daily_cap(succeeded_today, cap) {
            return Ok(Verdict::Skip(reason));
        }

        // A vanished entity fingerprints as empty content and fails the
        // sufficiency check below.
        let content = self
            .ctx
            .content
            .fetch(tenant_id, &event.entity_id)
            .await?
            .unwrap_or_else(|| EntityContent::new(event.entity_id.clone()));
        let hash = fingerprint(rule, &content);
        new_run.fingerprint_hash = Some(hash.clone());

        let latest = self
            .ctx
            .store
            .latest_settled(tenant_id, &event.entity_id, event.trigger_type)
            .await?
            .and_then(|run| run.as_prior());
        if let Err(reason) = check_idempotency(&hash, latest.as_ref()) {
            return Ok(Verdict::Skip(reason));
        }

        if let Err(reason) = check_sufficiency(has_sufficient_data(rule, &content)) {
            return Ok(Verdict::Skip(reason));
        }

        new_run.retry_of_run_id = rearm_source(latest.as_ref());
        Ok(Verdict::Admit)
    }

    async fn skip(&self, new_run: &NewRun, reason: SkipReason) -> Result<GateOutcome, EngineError> {
        let run = self.ctx.store.record_skip(new_run, reason).await?;

        tracing::info!(
            run_id = run.id,
            tenant_id = %run.tenant_id,
            entity_id = %run.entity_id,
            trigger_type = %run.trigger_type,
            rule_id = %run.rule_id,
            reason = %reason,
            "Automation skipped at gate",
        );

        audit::record(self.ctx.audit.as_ref(), &run).await;
        lifecycle::publish(&self.ctx.bus, &run);

        Ok(GateOutcome {
            decision: Decision::skip(reason),
            run,
        })
    }

    async fn admitted(&self, run: Run) -> Result<GateOutcome, EngineError> {
        tracing::info!(
            run_id = run.id,
            tenant_id = %run.tenant_id,
            entity_id = %run.entity_id,
            trigger_type = %run.trigger_type,
            rule_id = %run.rule_id,
            retry_of_run_id = ?run.retry_of_run_id,
            "Automation run queued",
        );

        if let Err(e) = self.queue.enqueue(run.id).await {
            tracing::warn!(run_id = run.id, error = %e, "Enqueue failed, run left for redelivery");
        }
        lifecycle::publish(&self.ctx.bus, &run);

        Ok(GateOutcome {
            decision: Decision::Proceed {
                rule_id: run.rule_id.clone(),
            },
            run,
        })
    }
}
