use std::time::Duration;

use assert_matches::assert_matches;
use autopilot_core::audit::verify_chain;
use autopilot_core::content::EntityContent;
use autopilot_core::gate::Decision;
use autopilot_core::reasons::{FailureKind, SkipReason};
use autopilot_core::rules::{RULE_ISSUE_ATTRIBUTE_FIX, RULE_SYNC_FAQ_ANSWERS};
use autopilot_core::run_events::{RUN_QUEUED, RUN_SKIPPED, RUN_SUCCEEDED};
use autopilot_core::trigger::{
    RawTriggerEvent, TriggerEvent, TriggerType, EVENT_CATALOG_ITEM_SYNCED,
    EVENT_QUALITY_ISSUE_DETECTED,
};
use autopilot_db::models::status::RunStatus;
use autopilot_engine::ingest::{ingest, TriggerListener, MALFORMED_EVENT};
use autopilot_engine::pool::{run_redelivery, WorkerPool};
use autopilot_engine::store::RunStore;
use autopilot_engine::sweep::sweep_once;
use autopilot_engine::testing::TestHarness;
use autopilot_events::DomainEvent;
use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn product(entity: &str) -> EntityContent {
    EntityContent::new(entity)
        .with_field("title", json!("Trail Jacket"))
        .with_field("description", json!("Waterproof shell"))
        .with_field("attributes", json!({"color": "red"}))
}

fn trigger(entity: &str) -> TriggerEvent {
    TriggerEvent {
        entity_id: entity.into(),
        trigger_type: TriggerType::ContentSynced,
        tenant_id: "t1".into(),
        occurred_at: Utc::now(),
        payload_digest: None,
    }
}

fn harness() -> TestHarness {
    let harness = TestHarness::new();
    harness.settings.set("t1", RULE_SYNC_FAQ_ANSWERS, true);
    harness.settings.set("t1", RULE_ISSUE_ATTRIBUTE_FIX, true);
    harness.content.put("t1", product("sku-1"));
    harness
}

#[tokio::test]
async fn sweep_fails_stuck_runs_and_frees_the_key() {
    let harness = harness();
    let outcome = harness.evaluator().evaluate(&trigger("sku-1")).await.unwrap();
    harness.store.claim(outcome.run.id, "stuck").await.unwrap().unwrap();
    harness
        .store
        .backdate_claim(outcome.run.id, chrono::Duration::hours(2));

    assert_eq!(sweep_once(&harness.ctx).await.unwrap(), 1);
    let swept = harness.store.get(outcome.run.id).unwrap();
    assert_eq!(swept.failure(), Some(FailureKind::Timeout));
    assert_eq!(harness.audit.for_run(swept.id).len(), 1);

    let retry = harness.evaluator().evaluate(&trigger("sku-1")).await.unwrap();
    assert_matches!(retry.decision, Decision::Proceed { .. });
    assert_eq!(retry.run.retry_of_run_id, Some(swept.id));
}

#[tokio::test]
async fn sweep_leaves_recent_runs_alone() {
    let harness = harness();
    let outcome = harness.evaluator().evaluate(&trigger("sku-1")).await.unwrap();
    harness.store.claim(outcome.run.id, "stuck").await.unwrap().unwrap();

    assert_eq!(sweep_once(&harness.ctx).await.unwrap(), 0);
    assert_eq!(
        harness.store.get(outcome.run.id).unwrap().status(),
        Some(RunStatus::Running)
    );
}

#[tokio::test]
async fn worker_pool_drains_the_queue() {
    let harness = harness();
    for n in 0..3 {
        let entity = format!("sku-{n}");
        harness.content.put("t1", product(&entity));
        harness.evaluator().evaluate(&trigger(&entity)).await.unwrap();
    }

    let cancel = CancellationToken::new();
    let pool = WorkerPool::new(harness.ctx.clone(), harness.receiver.clone(), "test");
    let handle = tokio::spawn(pool.run(cancel.clone()));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while harness
        .store
        .runs()
        .iter()
        .any(|r| r.status() != Some(RunStatus::Succeeded))
    {
        assert!(tokio::time::Instant::now() < deadline, "runs did not finish");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    cancel.cancel();
    handle.await.unwrap();
    assert!(harness
        .store
        .runs()
        .iter()
        .all(|r| r.claimed_by.as_deref().is_some_and(|w| w.starts_with("test-"))));
}

#[tokio::test]
async fn poller_redelivers_old_queued_runs() {
    let harness = TestHarness::new();
    harness.settings.set("t1", RULE_SYNC_FAQ_ANSWERS, true);
    harness.content.put("t1", product("sku-1"));

    // Admit through a queue nobody reads, as if the message were lost.
    let lost = autopilot_engine::Evaluator::new(
        harness.ctx.clone(),
        autopilot_engine::queue::RunQueue::durable_only(),
    );
    let outcome = lost.evaluate(&trigger("sku-1")).await.unwrap();
    harness
        .store
        .backdate_creation(outcome.run.id, chrono::Duration::minutes(5));

    let cancel = CancellationToken::new();
    let poller = tokio::spawn(run_redelivery(
        harness.ctx.store.clone(),
        harness.queue.clone(),
        Duration::from_millis(10),
        Duration::from_secs(30),
        cancel.clone(),
    ));

    let delivered = tokio::time::timeout(Duration::from_secs(5), harness.receiver.next())
        .await
        .unwrap();
    assert_eq!(delivered, Some(outcome.run.id));

    cancel.cancel();
    poller.await.unwrap();
}

#[tokio::test]
async fn bus_events_are_normalized_and_evaluated() {
    let harness = harness();
    let listener = TriggerListener::new(harness.evaluator());

    let synced = DomainEvent::new(EVENT_CATALOG_ITEM_SYNCED)
        .with_entity("t1", "sku-1")
        .with_payload(json!({"payload_digest": "abc"}));
    let outcome = listener.handle(&synced).await.unwrap();
    assert_matches!(outcome.decision, Decision::Proceed { .. });
    assert_eq!(outcome.run.payload_digest.as_deref(), Some("abc"));

    let issue = DomainEvent::new(EVENT_QUALITY_ISSUE_DETECTED).with_payload(json!({
        "tenantId": "t1",
        "entityId": "sku-1",
    }));
    let outcome = listener.handle(&issue).await.unwrap();
    assert_eq!(outcome.run.trigger_type, "issue_detected");

    assert!(listener
        .handle(&DomainEvent::new("catalog.item_deleted").with_entity("t1", "sku-1"))
        .await
        .is_none());
    assert!(listener
        .handle(&DomainEvent::new(EVENT_CATALOG_ITEM_SYNCED))
        .await
        .is_none());
}

#[tokio::test]
async fn catalog_outage_on_the_bus_is_recorded_as_a_failed_run() {
    let harness = harness();
    harness.content.set_unavailable(true);
    let listener = TriggerListener::new(harness.evaluator());
    let synced = DomainEvent::new(EVENT_CATALOG_ITEM_SYNCED).with_entity("t1", "sku-1");

    assert!(listener.handle(&synced).await.is_none());

    let max_attempts = harness.ctx.config.trigger_max_attempts as usize;
    assert_eq!(harness.content.calls(), max_attempts);
    let runs = harness.store.runs();
    assert_eq!(runs.len(), 1);
    let failed = &runs[0];
    assert_eq!(failed.status(), Some(RunStatus::Failed));
    assert_eq!(failed.failure(), Some(FailureKind::GateUnavailable));
    assert!(failed.error_details.as_deref().unwrap().contains("catalog"));
    assert_eq!(harness.audit.for_run(failed.id).len(), 1);

    // Once the catalog is back, the next sync re-arms the key.
    harness.content.set_unavailable(false);
    let retry = listener.handle(&synced).await.unwrap();
    assert_matches!(retry.decision, Decision::Proceed { .. });
    assert_eq!(retry.run.retry_of_run_id, Some(failed.id));
}

#[tokio::test]
async fn brief_catalog_outage_on_the_bus_is_retried() {
    let harness = harness();
    harness.content.fail_next(1);
    let listener = TriggerListener::new(harness.evaluator());
    let synced = DomainEvent::new(EVENT_CATALOG_ITEM_SYNCED).with_entity("t1", "sku-1");

    let outcome = listener.handle(&synced).await.unwrap();

    assert_matches!(outcome.decision, Decision::Proceed { .. });
    assert_eq!(harness.content.calls(), 2);
    let runs = harness.store.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status(), Some(RunStatus::Queued));
}

#[tokio::test]
async fn listener_task_consumes_the_bus() {
    let harness = harness();
    let cancel = CancellationToken::new();
    let listener = TriggerListener::new(harness.evaluator());
    let bus = harness.bus.clone();
    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { listener.run(&bus, cancel).await })
    };
    // Let the listener subscribe before publishing.
    tokio::time::sleep(Duration::from_millis(20)).await;

    harness
        .bus
        .publish(DomainEvent::new(EVENT_CATALOG_ITEM_SYNCED).with_entity("t1", "sku-1"));

    let delivered = tokio::time::timeout(Duration::from_secs(5), harness.receiver.next())
        .await
        .unwrap();
    assert!(delivered.is_some());

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn lifecycle_events_are_published() {
    let harness = harness();
    let mut rx = harness.bus.subscribe();

    let outcome = harness.evaluator().evaluate(&trigger("sku-1")).await.unwrap();
    harness.executor("w").execute(outcome.run.id).await.unwrap();
    harness.evaluator().evaluate(&trigger("sku-1")).await.unwrap();

    let names: Vec<String> = [
        rx.recv().await.unwrap(),
        rx.recv().await.unwrap(),
        rx.recv().await.unwrap(),
    ]
    .into_iter()
    .map(|e| e.event_type)
    .collect();
    assert_eq!(names, vec![RUN_QUEUED, RUN_SUCCEEDED, RUN_SKIPPED]);
}

#[tokio::test]
async fn ingest_reports_gate_outcome_and_rejects_malformed() {
    let harness = harness();
    let evaluator = harness.evaluator();

    let raw = RawTriggerEvent {
        entity_id: Some("sku-1".into()),
        tenant_id: Some("t1".into()),
        trigger_type: Some("content_synced".into()),
        ..Default::default()
    };
    let accepted = ingest(&evaluator, &raw).await.unwrap();
    assert!(accepted.accepted);
    assert!(accepted.reason.is_none());
    assert!(accepted.run_id.is_some());

    let skipped = ingest(&evaluator, &raw).await.unwrap();
    assert!(skipped.accepted);
    assert_eq!(
        skipped.reason.as_deref(),
        Some(SkipReason::AlreadyInFlight.as_str())
    );

    let missing_tenant = RawTriggerEvent {
        tenant_id: None,
        ..raw
    };
    let rejected = ingest(&evaluator, &missing_tenant).await.unwrap();
    assert!(!rejected.accepted);
    assert_eq!(rejected.reason.as_deref(), Some(MALFORMED_EVENT));
    assert_eq!(harness.store.runs().len(), 2);
}

#[tokio::test]
async fn audit_chain_covers_every_outcome() {
    let harness = harness();
    let evaluator = harness.evaluator();

    let first = evaluator.evaluate(&trigger("sku-1")).await.unwrap();
    harness.executor("w").execute(first.run.id).await.unwrap();
    evaluator.evaluate(&trigger("sku-1")).await.unwrap();
    evaluator.evaluate(&trigger("sku-missing")).await.unwrap();

    let entries = harness.audit.entries();
    assert_eq!(entries.len(), 3);
    let data: Vec<String> = entries.iter().map(|e| e.canonical_data()).collect();
    let verification = verify_chain(
        None,
        data.iter()
            .zip(&entries)
            .map(|(d, e)| (d.as_str(), e.integrity_hash.as_str())),
    );
    assert!(verification.is_intact());
}
