//! Executor state machine for one Run.
//!
//! ```text
//! QUEUED --claim--> RUNNING --persisted--------------> SUCCEEDED
//!                   RUNNING --content changed---------> SKIPPED(stale_fingerprint)
//!                   RUNNING --nothing usable----------> SKIPPED(cannot_generate_safely)
//!                   RUNNING --generation/persistence--> FAILED(error)
//! ```
//!
//! Every step after the claim produces a [`Terminal`] value; collaborator
//! errors are folded into the Run instead of escaping. Only failures to
//! reach the run store surface as [`EngineError`].

use autopilot_core::content::{build_context, fingerprint, EntityContent};
use autopilot_core::error::CoreError;
use autopilot_core::generation::{retain_confident, GenerationResponse};
use autopilot_core::reasons::{FailureKind, SkipReason};
use autopilot_core::types::DbId;
use autopilot_db::models::run::{Completion, Run};
use serde_json::Value;

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::retry::{self, RetryPolicy};
use crate::{audit, lifecycle};

/// What happened to a delivered Run id.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The Run was not `QUEUED` any more (duplicate delivery).
    NotClaimed,
    /// The Run left `RUNNING` before this worker finished (e.g. swept).
    Superseded,
    Finished(Run),
}

enum Terminal {
    Succeeded(Completion),
    Skipped(SkipReason, Completion),
    Failed(FailureKind, String, Completion),
}

/// Executes claimed Runs on behalf of one worker identity.
#[derive(Clone)]
pub struct Executor {
    ctx: EngineContext,
    worker_id: String,
}

impl Executor {
    pub fn new(ctx: EngineContext, worker_id: impl Into<String>) -> Self {
        Self {
            ctx,
            worker_id: worker_id.into(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claim and run one Run to a terminal state.
    pub async fn execute(&self, run_id: DbId) -> Result<ExecutionOutcome, EngineError> {
        let Some(run) = self.ctx.store.claim(run_id, &self.worker_id).await? else {
            tracing::debug!(run_id, worker = %self.worker_id, "Run already claimed, ignoring delivery");
            return Ok(ExecutionOutcome::NotClaimed);
        };

        tracing::debug!(
            run_id,
            worker = %self.worker_id,
            tenant_id = %run.tenant_id,
            entity_id = %run.entity_id,
            "Run claimed",
        );

        let terminal = self.steps(&run).await;
        let applied = match &terminal {
            Terminal::Succeeded(completion) => {
                self.ctx.store.complete(run_id, completion).await?
            }
            Terminal::Skipped(reason, completion) => {
                self.ctx.store.skip_running(run_id, *reason, completion).await?
            }
            Terminal::Failed(kind, detail, completion) => {
                self.ctx
                    .store
                    .fail_running(run_id, *kind, detail, completion)
                    .await?
            }
        };

        if !applied {
            tracing::warn!(run_id, worker = %self.worker_id, "Run left RUNNING before completion, result discarded");
            return Ok(ExecutionOutcome::Superseded);
        }

        let finished = self
            .ctx
            .store
            .find(run_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "run",
                id: run_id,
            })?;

        match &terminal {
            Terminal::Succeeded(completion) => tracing::info!(
                run_id,
                tenant_id = %finished.tenant_id,
                entity_id = %finished.entity_id,
                rule_id = %finished.rule_id,
                attempts = completion.attempts,
                "Automation run succeeded",
            ),
            Terminal::Skipped(reason, _) => tracing::info!(
                run_id,
                tenant_id = %finished.tenant_id,
                entity_id = %finished.entity_id,
                rule_id = %finished.rule_id,
                reason = %reason,
                "Automation run skipped",
            ),
            Terminal::Failed(kind, detail, _) => tracing::warn!(
                run_id,
                tenant_id = %finished.tenant_id,
                entity_id = %finished.entity_id,
                rule_id = %finished.rule_id,
                error = %kind,
                detail = %detail,
                "Automation run failed",
            ),
        }

        audit::record(self.ctx.audit.as_ref(), &finished).await;
        lifecycle::publish(&self.ctx.bus, &finished);

        Ok(ExecutionOutcome::Finished(finished))
    }

    async fn steps(&self, run: &Run) -> Terminal {
        let mut completion = Completion::default();

        let Some(rule) = self.ctx.rules.get(&run.rule_id) else {
            return Terminal::Failed(
                FailureKind::GenerationError,
                format!("rule '{}' is not configured", run.rule_id),
                completion,
            );
        };

        let content = match self.ctx.content.fetch(&run.tenant_id, &run.entity_id).await {
            Ok(Some(content)) => content,
            Ok(None) => EntityContent::new(run.entity_id.clone()),
            Err(e) => {
                return Terminal::Failed(FailureKind::ContentUnavailable, e.to_string(), completion)
            }
        };

        let hash = fingerprint(rule, &content);
        if run.fingerprint_hash.as_deref() != Some(hash.as_str()) {
            return Terminal::Skipped(SkipReason::StaleFingerprint, completion);
        }

        let surface = rule.target_surface.as_str();
        completion.before_snapshot = match self
            .ctx
            .content_store
            .snapshot(&run.tenant_id, &run.entity_id, surface)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return Terminal::Failed(FailureKind::PersistenceFailure, e.to_string(), completion)
            }
        };

        let context = build_context(rule, &content, &hash);
        let generated = retry::generate(
            self.ctx.generator.as_ref(),
            &run.entity_id,
            &context,
            RetryPolicy::from(&self.ctx.config),
        )
        .await;
        completion.attempts = i16::try_from(generated.attempts).unwrap_or(i16::MAX);

        let items = match generated.result {
            Ok(GenerationResponse::Items { items }) => {
                retain_confident(items, self.ctx.config.min_confidence)
            }
            Ok(GenerationResponse::InsufficientData) => Vec::new(),
            Err(e) if e.is_transient() => {
                return Terminal::Failed(
                    FailureKind::GenerationTransientError,
                    e.to_string(),
                    completion,
                )
            }
            Err(e) => return Terminal::Failed(FailureKind::GenerationError, e.to_string(), completion),
        };
        if items.is_empty() {
            return Terminal::Skipped(SkipReason::CannotGenerateSafely, completion);
        }

        if let Err(e) = self
            .ctx
            .content_store
            .write_generated_content(&run.tenant_id, &run.entity_id, surface, &items)
            .await
        {
            return Terminal::Failed(FailureKind::PersistenceFailure, e.to_string(), completion);
        }

        completion.after_snapshot = match self
            .ctx
            .content_store
            .snapshot(&run.tenant_id, &run.entity_id, surface)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(run_id = run.id, error = %e, "After snapshot unavailable, recording written items");
                serde_json::to_value(&items).ok().or(Some(Value::Null))
            }
        };

        Terminal::Succeeded(completion)
    }
}
