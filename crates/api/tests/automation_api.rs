//! End-to-end tests: ingest over HTTP, execute with a test worker, then read
//! the outcome back through the query, usage, summary and audit endpoints.

mod common;

use assert_matches::assert_matches;
use autopilot_core::content::EntityContent;
use autopilot_core::rules::{RULE_ISSUE_ATTRIBUTE_FIX, RULE_SYNC_FAQ_ANSWERS};
use autopilot_db::models::status::RunStatus;
use autopilot_engine::ExecutionOutcome;
use axum::http::StatusCode;
use common::{body_json, get, post_json, put_json, TestApp};
use serde_json::json;
use sqlx::PgPool;

const TENANT: &str = "tenant-http";
const ENTITY: &str = "sku-100";

fn seed_product(app: &TestApp) {
    app.content.put(
        TENANT,
        EntityContent::new(ENTITY)
            .with_field("title", json!("Canvas Tote"))
            .with_field("description", json!("Heavy cotton, inner pocket")),
    );
}

fn trigger_body() -> serde_json::Value {
    json!({
        "entityId": ENTITY,
        "tenantId": TENANT,
        "triggerType": "content_synced",
        "payloadDigest": "digest-1",
        "occurredAt": "2026-03-01T12:00:00Z",
    })
}

async fn enable(app: &TestApp, rule_id: &str) {
    let uri = format!("/api/v1/tenants/{TENANT}/automation/settings/{rule_id}");
    let response = put_json(app.router.clone(), &uri, json!({ "enabled": true })).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn trigger_with_setting_off_is_accepted_and_skipped(pool: PgPool) {
    let app = common::build_test_app(pool);
    seed_product(&app);

    let response = post_json(app.router.clone(), "/api/v1/triggers", trigger_body()).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["accepted"], true);
    assert_eq!(json["data"]["reason"], "setting_disabled");
    assert!(json["data"]["run_id"].is_i64());
    assert_eq!(app.generator.calls(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn malformed_trigger_returns_400(pool: PgPool) {
    let app = common::build_test_app(pool);

    let response = post_json(
        app.router.clone(),
        "/api/v1/triggers",
        json!({ "tenantId": TENANT, "triggerType": "content_synced" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["data"]["accepted"], false);
    assert_eq!(json["data"]["reason"], "malformed_event");
    assert!(json["data"]["detail"].as_str().unwrap().contains("entity_id"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_trigger_type_is_malformed(pool: PgPool) {
    let app = common::build_test_app(pool);

    let mut body = trigger_body();
    body["triggerType"] = json!("price_changed");
    let response = post_json(app.router.clone(), "/api/v1/triggers", body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["data"]["reason"], "malformed_event");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn wrongly_typed_field_is_malformed(pool: PgPool) {
    let app = common::build_test_app(pool);

    let mut body = trigger_body();
    body["occurredAt"] = json!(12);
    let response = post_json(app.router.clone(), "/api/v1/triggers", body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["data"]["accepted"], false);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn entitlement_denial_is_reported(pool: PgPool) {
    let app = common::build_test_app(pool);
    seed_product(&app);
    enable(&app, RULE_SYNC_FAQ_ANSWERS).await;
    app.entitlements.deny(TENANT);

    let response = post_json(app.router.clone(), "/api/v1/triggers", trigger_body()).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(
        body_json(response).await["data"]["reason"],
        "entitlement_not_allowed"
    );
}

// ---------------------------------------------------------------------------
// Full lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn admitted_run_is_visible_across_endpoints(pool: PgPool) {
    let app = common::build_test_app(pool);
    seed_product(&app);
    enable(&app, RULE_SYNC_FAQ_ANSWERS).await;

    let response = post_json(app.router.clone(), "/api/v1/triggers", trigger_body()).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert!(json["data"].get("reason").is_none());
    let run_id = json["data"]["run_id"].as_i64().unwrap();

    let queued = app.receiver.next().await;
    assert_eq!(queued, Some(run_id));

    let outcome = app.executor().execute(run_id).await.unwrap();
    assert_matches!(outcome, ExecutionOutcome::Finished(ref run) if run.status() == Some(RunStatus::Succeeded));
    assert_eq!(app.content_store.writes(), 1);

    // Run detail.
    let json = body_json(get(app.router.clone(), &format!("/api/v1/runs/{run_id}")).await).await;
    assert_eq!(json["data"]["status_id"], RunStatus::Succeeded.id());
    assert_eq!(json["data"]["payload_digest"], "digest-1");
    assert_eq!(json["data"]["claimed_by"], "test-worker");
    assert!(json["data"]["fingerprint_hash"].is_string());

    // Audit entries for the run.
    let json =
        body_json(get(app.router.clone(), &format!("/api/v1/runs/{run_id}/audit")).await).await;
    let entries = json["data"].as_array().unwrap();
    assert!(!entries.is_empty());
    assert_eq!(entries.last().unwrap()["status_id"], RunStatus::Succeeded.id());

    // Usage and summary.
    let uri = format!("/api/v1/tenants/{TENANT}/automation/usage/{RULE_SYNC_FAQ_ANSWERS}");
    let json = body_json(get(app.router.clone(), &uri).await).await;
    assert_eq!(json["data"]["count_today"], 1);

    let uri = format!("/api/v1/tenants/{TENANT}/automation/summary");
    let json = body_json(get(app.router.clone(), &uri).await).await;
    assert_eq!(json["data"]["succeeded_today"], 1);
    assert_eq!(json["data"]["pending"], 0);

    // Chain verification.
    let uri = format!("/api/v1/tenants/{TENANT}/automation/audit/verify");
    let json = body_json(get(app.router.clone(), &uri).await).await;
    assert_eq!(json["data"]["intact"], true);
    assert!(json["data"]["entries_checked"].as_u64().unwrap() >= 1);
    assert!(json["data"]["first_broken_id"].is_null());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn repeated_trigger_after_success_is_idempotent(pool: PgPool) {
    let app = common::build_test_app(pool);
    seed_product(&app);
    enable(&app, RULE_SYNC_FAQ_ANSWERS).await;

    let json = body_json(post_json(app.router.clone(), "/api/v1/triggers", trigger_body()).await).await;
    let run_id = json["data"]["run_id"].as_i64().unwrap();
    app.executor().execute(run_id).await.unwrap();

    let json = body_json(post_json(app.router.clone(), "/api/v1/triggers", trigger_body()).await).await;
    assert_eq!(json["data"]["reason"], "idempotent_already_done");
    assert_eq!(app.generator.calls(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn second_trigger_while_queued_is_already_in_flight(pool: PgPool) {
    let app = common::build_test_app(pool);
    seed_product(&app);
    enable(&app, RULE_SYNC_FAQ_ANSWERS).await;

    let first = body_json(post_json(app.router.clone(), "/api/v1/triggers", trigger_body()).await).await;
    let second = body_json(post_json(app.router.clone(), "/api/v1/triggers", trigger_body()).await).await;

    assert!(first["data"].get("reason").is_none());
    assert_eq!(second["data"]["reason"], "already_in_flight");
}

// ---------------------------------------------------------------------------
// Run query surface
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_runs_filters_by_status(pool: PgPool) {
    let app = common::build_test_app(pool);
    seed_product(&app);

    // Two skipped (setting off), then one queued.
    post_json(app.router.clone(), "/api/v1/triggers", trigger_body()).await;
    post_json(app.router.clone(), "/api/v1/triggers", trigger_body()).await;
    enable(&app, RULE_SYNC_FAQ_ANSWERS).await;
    post_json(app.router.clone(), "/api/v1/triggers", trigger_body()).await;

    let uri = format!("/api/v1/runs?tenant_id={TENANT}&status=skipped");
    let json = body_json(get(app.router.clone(), &uri).await).await;
    assert_eq!(json["total"], 2);
    assert_eq!(json["data"].as_array().unwrap().len(), 2);

    let uri = format!("/api/v1/runs?tenant_id={TENANT}&status=QUEUED&limit=1");
    let json = body_json(get(app.router.clone(), &uri).await).await;
    assert_eq!(json["total"], 1);

    let uri = format!("/api/v1/runs?tenant_id={TENANT}&trigger_type=content_synced&limit=1");
    let json = body_json(get(app.router.clone(), &uri).await).await;
    assert_eq!(json["total"], 3);
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_runs_rejects_unknown_status(pool: PgPool) {
    let app = common::build_test_app(pool);

    let response = get(app.router.clone(), "/api/v1/runs?status=done").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn missing_run_returns_404(pool: PgPool) {
    let app = common::build_test_app(pool);

    let response = get(app.router.clone(), "/api/v1/runs/999999").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Run with id 999999 not found");
}

// ---------------------------------------------------------------------------
// Settings and catalog
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn new_tenant_sees_every_rule_off(pool: PgPool) {
    let app = common::build_test_app(pool);

    let uri = format!("/api/v1/tenants/{TENANT}/automation/settings");
    let json = body_json(get(app.router.clone(), &uri).await).await;
    let settings = json["data"].as_array().unwrap();

    assert_eq!(settings.len(), 2);
    assert!(settings.iter().all(|s| s["enabled"] == false));
    let rule_ids: Vec<_> = settings.iter().map(|s| s["rule_id"].as_str().unwrap()).collect();
    assert!(rule_ids.contains(&RULE_SYNC_FAQ_ANSWERS));
    assert!(rule_ids.contains(&RULE_ISSUE_ATTRIBUTE_FIX));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn toggle_is_reflected_in_listing(pool: PgPool) {
    let app = common::build_test_app(pool);
    enable(&app, RULE_ISSUE_ATTRIBUTE_FIX).await;

    let uri = format!("/api/v1/tenants/{TENANT}/automation/settings");
    let json = body_json(get(app.router.clone(), &uri).await).await;
    let fix = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["rule_id"] == RULE_ISSUE_ATTRIBUTE_FIX)
        .unwrap()
        .clone();
    assert_eq!(fix["enabled"], true);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn toggling_unknown_rule_returns_404(pool: PgPool) {
    let app = common::build_test_app(pool);

    let uri = format!("/api/v1/tenants/{TENANT}/automation/settings/not_a_rule");
    let response = put_json(app.router.clone(), &uri, json!({ "enabled": true })).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn rule_catalog_is_listed(pool: PgPool) {
    let app = common::build_test_app(pool);

    let json = body_json(get(app.router.clone(), "/api/v1/rules").await).await;
    let rules = json["data"].as_array().unwrap();

    assert_eq!(rules.len(), 2);
    assert!(rules.iter().all(|r| r["enabled_by_default"] == false));
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn audit_query_filters_by_entity(pool: PgPool) {
    let app = common::build_test_app(pool);
    seed_product(&app);

    post_json(app.router.clone(), "/api/v1/triggers", trigger_body()).await;
    let mut other = trigger_body();
    other["entityId"] = json!("sku-200");
    post_json(app.router.clone(), "/api/v1/triggers", other).await;

    let uri = format!("/api/v1/tenants/{TENANT}/automation/audit?entity_id={ENTITY}");
    let json = body_json(get(app.router.clone(), &uri).await).await;
    let entries = json["data"].as_array().unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["entity_id"], ENTITY);
    assert_eq!(entries[0]["reason"], "setting_disabled");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn empty_chain_verifies(pool: PgPool) {
    let app = common::build_test_app(pool);

    let uri = "/api/v1/tenants/nobody/automation/audit/verify";
    let json = body_json(get(app.router.clone(), uri).await).await;

    assert_eq!(json["data"]["intact"], true);
    assert_eq!(json["data"]["entries_checked"], 0);
}
