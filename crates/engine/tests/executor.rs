use std::time::Duration;

use assert_matches::assert_matches;
use autopilot_core::content::EntityContent;
use autopilot_core::gate::Decision;
use autopilot_core::generation::{GeneratedItem, GenerationError, GenerationResponse};
use autopilot_core::reasons::{FailureKind, SkipReason};
use autopilot_core::rules::RULE_SYNC_FAQ_ANSWERS;
use autopilot_core::trigger::{TriggerEvent, TriggerType};
use autopilot_db::models::run::Run;
use autopilot_db::models::status::RunStatus;
use autopilot_engine::executor::ExecutionOutcome;
use autopilot_engine::testing::{confident_item, TestHarness};
use chrono::Utc;
use serde_json::json;

const TENANT: &str = "tenant-b";
const ENTITY: &str = "sku-1";

fn trigger() -> TriggerEvent {
    TriggerEvent {
        entity_id: ENTITY.into(),
        trigger_type: TriggerType::ContentSynced,
        tenant_id: TENANT.into(),
        occurred_at: Utc::now(),
        payload_digest: Some("digest-1".into()),
    }
}

fn product(description: &str) -> EntityContent {
    EntityContent::new(ENTITY)
        .with_field("title", json!("Trail Jacket"))
        .with_field("description", json!(description))
}

fn harness() -> TestHarness {
    let harness = TestHarness::new();
    harness.settings.set(TENANT, RULE_SYNC_FAQ_ANSWERS, true);
    harness.content.put(TENANT, product("Waterproof shell"));
    harness
}

/// Admit a Run and execute it to completion.
async fn run_once(harness: &TestHarness) -> Run {
    let outcome = harness.evaluator().evaluate(&trigger()).await.unwrap();
    assert_matches!(outcome.decision, Decision::Proceed { .. });
    match harness.executor("w").execute(outcome.run.id).await.unwrap() {
        ExecutionOutcome::Finished(run) => run,
        other => panic!("run did not finish: {other:?}"),
    }
}

#[tokio::test]
async fn success_persists_items_and_snapshots() {
    let harness = harness();
    let run = run_once(&harness).await;

    assert_eq!(run.status(), Some(RunStatus::Succeeded));
    assert_eq!(run.attempts, 1);
    assert_eq!(run.claimed_by.as_deref(), Some("w"));
    assert!(run.before_snapshot.is_none());
    assert!(run.after_snapshot.is_some());
    assert_eq!(harness.content_store.items(TENANT, ENTITY, "product_faq").len(), 1);

    let audit = harness.audit.for_run(run.id);
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].status_id, RunStatus::Succeeded.id());
}

#[tokio::test]
async fn before_snapshot_captures_previous_content() {
    let harness = harness();
    run_once(&harness).await;

    harness.content.put(TENANT, product("Waterproof shell, new zips"));
    let second = run_once(&harness).await;
    let before = second.before_snapshot.expect("previous items recorded");
    assert_eq!(before[0]["key"], "faq_1");
}

#[tokio::test]
async fn insufficient_data_from_generator_is_skipped_not_fabricated() {
    let harness = harness();
    harness
        .generator
        .set_fallback(Ok(GenerationResponse::InsufficientData));

    let run = run_once(&harness).await;
    assert_eq!(run.status(), Some(RunStatus::Skipped));
    assert_eq!(run.skip_reason(), Some(SkipReason::CannotGenerateSafely));
    assert_eq!(harness.content_store.writes(), 0);
    assert!(run.after_snapshot.is_none());
}

#[tokio::test]
async fn unconfident_items_are_dropped_never_filled_in() {
    let harness = harness();
    harness.generator.push(Ok(GenerationResponse::Items {
        items: vec![
            GeneratedItem {
                key: "faq_low".into(),
                value: Some(json!("Maybe")),
                confidence: 0.2,
                source_fields_used: vec!["description".into()],
            },
            GeneratedItem {
                key: "faq_null".into(),
                value: None,
                confidence: 0.99,
                source_fields_used: vec!["description".into()],
            },
            GeneratedItem {
                key: "faq_ungrounded".into(),
                value: Some(json!("Yes")),
                confidence: 0.99,
                source_fields_used: vec![],
            },
            confident_item("faq_ok", "Yes, fully seam-sealed"),
        ],
    }));

    let run = run_once(&harness).await;
    assert_eq!(run.status(), Some(RunStatus::Succeeded));
    let written = harness.content_store.items(TENANT, ENTITY, "product_faq");
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].key, "faq_ok");
}

#[tokio::test]
async fn no_usable_items_is_cannot_generate_safely() {
    let harness = harness();
    harness.generator.push(Ok(GenerationResponse::Items {
        items: vec![GeneratedItem {
            key: "faq_low".into(),
            value: Some(json!("Maybe")),
            confidence: 0.1,
            source_fields_used: vec!["description".into()],
        }],
    }));

    let run = run_once(&harness).await;
    assert_eq!(run.skip_reason(), Some(SkipReason::CannotGenerateSafely));
    assert_eq!(harness.content_store.writes(), 0);
}

#[tokio::test]
async fn content_change_after_admission_is_stale() {
    let harness = harness();
    let outcome = harness.evaluator().evaluate(&trigger()).await.unwrap();

    harness.content.put(TENANT, product("Edited before the worker ran"));
    let finished = harness.executor("w").execute(outcome.run.id).await.unwrap();

    assert_matches!(
        finished,
        ExecutionOutcome::Finished(run) if run.skip_reason() == Some(SkipReason::StaleFingerprint)
    );
    assert_eq!(harness.generator.calls(), 0);
}

#[tokio::test]
async fn two_timeouts_then_success_within_retry_budget() {
    let harness = harness();
    harness.generator.push(Err(GenerationError::Timeout(60)));
    harness.generator.push(Err(GenerationError::Timeout(60)));

    let run = run_once(&harness).await;
    assert_eq!(run.status(), Some(RunStatus::Succeeded));
    assert_eq!(run.attempts, 3);
    assert_eq!(harness.generator.calls(), 3);
}

#[tokio::test]
async fn three_transient_failures_fail_the_run() {
    let harness = harness();
    harness
        .generator
        .set_fallback(Err(GenerationError::RateLimited("slow down".into())));

    let run = run_once(&harness).await;
    assert_eq!(run.status(), Some(RunStatus::Failed));
    assert_eq!(run.failure(), Some(FailureKind::GenerationTransientError));
    assert_eq!(run.attempts, 3);
    assert_eq!(harness.generator.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn hung_generator_is_bounded_by_attempt_timeout() {
    let harness = harness();
    harness.generator.set_delay(Some(Duration::from_secs(3600)));

    let run = run_once(&harness).await;
    assert_eq!(run.failure(), Some(FailureKind::GenerationTransientError));
    assert_eq!(run.attempts, 3);
    assert!(run.error_details.unwrap().contains("timed out"));
}

#[tokio::test]
async fn rejected_generation_fails_without_retry() {
    let harness = harness();
    harness
        .generator
        .push(Err(GenerationError::Rejected("unsupported locale".into())));

    let run = run_once(&harness).await;
    assert_eq!(run.failure(), Some(FailureKind::GenerationError));
    assert_eq!(harness.generator.calls(), 1);
}

#[tokio::test]
async fn write_failure_is_persistence_failure_with_no_partial_write() {
    let harness = harness();
    harness.content_store.set_fail_writes(true);

    let run = run_once(&harness).await;
    assert_eq!(run.failure(), Some(FailureKind::PersistenceFailure));
    assert!(run.error_details.is_some());
    assert!(harness
        .content_store
        .items(TENANT, ENTITY, "product_faq")
        .is_empty());
}

#[tokio::test]
async fn unavailable_catalog_fails_the_run() {
    let harness = harness();
    let outcome = harness.evaluator().evaluate(&trigger()).await.unwrap();

    harness.content.set_unavailable(true);
    let finished = harness.executor("w").execute(outcome.run.id).await.unwrap();
    assert_matches!(
        finished,
        ExecutionOutcome::Finished(run) if run.failure() == Some(FailureKind::ContentUnavailable)
    );
}

#[tokio::test]
async fn failed_run_is_rearmed_by_next_trigger() {
    let harness = harness();
    harness.content_store.set_fail_writes(true);
    let failed = run_once(&harness).await;
    assert_eq!(failed.status(), Some(RunStatus::Failed));

    harness.content_store.set_fail_writes(false);
    let retried = run_once(&harness).await;
    assert_eq!(retried.status(), Some(RunStatus::Succeeded));
    assert_eq!(retried.retry_of_run_id, Some(failed.id));
    assert_eq!(retried.fingerprint_hash, failed.fingerprint_hash);

    // And now the unchanged content is settled.
    let third = harness.evaluator().evaluate(&trigger()).await.unwrap();
    assert_eq!(
        third.decision,
        Decision::skip(SkipReason::IdempotentAlreadyDone)
    );
}

#[tokio::test]
async fn concurrent_retriggers_after_failure_rearm_once() {
    let harness = harness();
    harness.content_store.set_fail_writes(true);
    let failed = run_once(&harness).await;
    harness.content_store.set_fail_writes(false);

    let evaluator = harness.evaluator();
    let event = trigger();
    let outcomes = futures::future::join_all((0..5).map(|_| evaluator.evaluate(&event))).await;
    let admitted: Vec<_> = outcomes
        .into_iter()
        .map(Result::unwrap)
        .filter(|o| matches!(o.decision, Decision::Proceed { .. }))
        .collect();
    assert_eq!(admitted.len(), 1);
    assert_eq!(admitted[0].run.retry_of_run_id, Some(failed.id));
}

#[tokio::test]
async fn redelivered_finished_run_is_ignored() {
    let harness = harness();
    let run = run_once(&harness).await;

    let again = harness.executor("other").execute(run.id).await.unwrap();
    assert_eq!(again, ExecutionOutcome::NotClaimed);
    assert_eq!(harness.audit.for_run(run.id).len(), 1);
}
