//! In-memory doubles for the run store and every collaborator.
//!
//! [`MemoryRunStore`] reproduces the database guarantees the engine relies
//! on: one live Run per key, claim as compare-and-swap, and terminal
//! transitions conditional on `RUNNING`. Used by this crate's tests and by
//! the API tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use autopilot_core::audit::compute_integrity_hash;
use autopilot_core::collaborators::{
    CollaboratorError, ContentSource, ContentStore, Entitlement, Entitlements, Generator,
    SettingsSource,
};
use autopilot_core::content::{ContentContext, EntityContent};
use autopilot_core::generation::{GeneratedItem, GenerationError, GenerationResponse};
use autopilot_core::reasons::{FailureKind, SkipReason};
use autopilot_core::rules::RuleCatalog;
use autopilot_core::trigger::TriggerType;
use autopilot_core::types::{DbId, Timestamp};
use autopilot_db::models::audit::{AutomationAuditLog, CreateAuditLog};
use autopilot_db::models::run::{Completion, NewRun, Run};
use autopilot_db::models::status::RunStatus;
use autopilot_events::EventBus;
use chrono::Utc;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::executor::Executor;
use crate::gate::Evaluator;
use crate::queue::{self, RunQueue, RunReceiver};
use crate::store::{AuditWriter, RunStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Run store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryRunStore {
    runs: Mutex<Vec<Run>>,
}

impl MemoryRunStore {
    pub fn runs(&self) -> Vec<Run> {
        lock(&self.runs).clone()
    }

    pub fn get(&self, run_id: DbId) -> Option<Run> {
        lock(&self.runs).iter().find(|r| r.id == run_id).cloned()
    }

    /// Force a Run's claim time into the past (for sweep tests).
    pub fn backdate_claim(&self, run_id: DbId, by: chrono::Duration) {
        if let Some(run) = lock(&self.runs).iter_mut().find(|r| r.id == run_id) {
            run.claimed_at = run.claimed_at.map(|at| at - by);
        }
    }

    /// Force a Run's creation time into the past (for redelivery tests).
    pub fn backdate_creation(&self, run_id: DbId, by: chrono::Duration) {
        if let Some(run) = lock(&self.runs).iter_mut().find(|r| r.id == run_id) {
            run.created_at -= by;
        }
    }

    fn insert(runs: &mut Vec<Run>, input: &NewRun, status: RunStatus) -> Run {
        let now = Utc::now();
        let run = Run {
            id: runs.len() as DbId + 1,
            tenant_id: input.tenant_id.clone(),
            entity_id: input.entity_id.clone(),
            trigger_type: input.trigger_type.as_str().to_string(),
            rule_id: input.rule_id.clone(),
            action: input.action.clone(),
            status_id: status.id(),
            fingerprint_hash: input.fingerprint_hash.clone(),
            payload_digest: input.payload_digest.clone(),
            reason_skipped: None,
            before_snapshot: None,
            after_snapshot: None,
            error: None,
            error_details: None,
            attempts: 0,
            retry_of_run_id: input.retry_of_run_id,
            claimed_by: None,
            occurred_at: input.occurred_at,
            created_at: now,
            claimed_at: None,
            completed_at: None,
            updated_at: now,
        };
        runs.push(run.clone());
        run
    }

    fn finish(
        &self,
        run_id: DbId,
        status: RunStatus,
        reason: Option<SkipReason>,
        failure: Option<(FailureKind, &str)>,
        completion: &Completion,
    ) -> bool {
        let mut runs = lock(&self.runs);
        let Some(run) = runs
            .iter_mut()
            .find(|r| r.id == run_id && r.status_id == RunStatus::Running.id())
        else {
            return false;
        };
        let now = Utc::now();
        run.status_id = status.id();
        run.reason_skipped = reason.map(|r| r.as_str().to_string());
        run.error = failure.map(|(kind, _)| kind.as_str().to_string());
        run.error_details = failure.map(|(_, detail)| detail.to_string());
        run.before_snapshot = completion.before_snapshot.clone();
        run.after_snapshot = completion.after_snapshot.clone();
        run.attempts = completion.attempts;
        run.completed_at = Some(now);
        run.updated_at = now;
        true
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn try_enqueue(&self, input: &NewRun) -> Result<Option<Run>, EngineError> {
        let mut runs = lock(&self.runs);
        let live = runs.iter().any(|r| {
            r.tenant_id == input.tenant_id
                && r.entity_id == input.entity_id
                && r.trigger_type == input.trigger_type.as_str()
                && r.status().is_some_and(|s| !s.is_terminal())
        });
        if live {
            return Ok(None);
        }
        Ok(Some(Self::insert(&mut runs, input, RunStatus::Queued)))
    }

    async fn record_skip(&self, input: &NewRun, reason: SkipReason) -> Result<Run, EngineError> {
        let mut runs = lock(&self.runs);
        let mut run = Self::insert(&mut runs, input, RunStatus::Skipped);
        run.reason_skipped = Some(reason.as_str().to_string());
        run.completed_at = Some(run.created_at);
        if let Some(stored) = runs.last_mut() {
            *stored = run.clone();
        }
        Ok(run)
    }

    async fn record_failure(
        &self,
        input: &NewRun,
        kind: FailureKind,
        detail: &str,
    ) -> Result<Run, EngineError> {
        let mut runs = lock(&self.runs);
        let mut run = Self::insert(&mut runs, input, RunStatus::Failed);
        run.error = Some(kind.as_str().to_string());
        run.error_details = Some(detail.to_string());
        run.completed_at = Some(run.created_at);
        if let Some(stored) = runs.last_mut() {
            *stored = run.clone();
        }
        Ok(run)
    }

    async fn latest_settled(
        &self,
        tenant_id: &str,
        entity_id: &str,
        trigger_type: TriggerType,
    ) -> Result<Option<Run>, EngineError> {
        Ok(lock(&self.runs)
            .iter()
            .rev()
            .find(|r| {
                r.tenant_id == tenant_id
                    && r.entity_id == entity_id
                    && r.trigger_type == trigger_type.as_str()
                    && match r.status() {
                        Some(RunStatus::Succeeded | RunStatus::Failed) => true,
                        Some(RunStatus::Skipped) => {
                            r.skip_reason().is_some_and(|reason| reason.settles_fingerprint())
                        }
                        _ => false,
                    }
            })
            .cloned())
    }

    async fn count_succeeded_since(
        &self,
        tenant_id: &str,
        rule_id: &str,
        since: Timestamp,
    ) -> Result<i64, EngineError> {
        Ok(lock(&self.runs)
            .iter()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && r.rule_id == rule_id
                    && r.status() == Some(RunStatus::Succeeded)
                    && r.completed_at.is_some_and(|at| at >= since)
            })
            .count() as i64)
    }

    async fn claim(&self, run_id: DbId, worker: &str) -> Result<Option<Run>, EngineError> {
        let mut runs = lock(&self.runs);
        let Some(run) = runs
            .iter_mut()
            .find(|r| r.id == run_id && r.status_id == RunStatus::Queued.id())
        else {
            return Ok(None);
        };
        let now = Utc::now();
        run.status_id = RunStatus::Running.id();
        run.claimed_at = Some(now);
        run.claimed_by = Some(worker.to_string());
        run.updated_at = now;
        Ok(Some(run.clone()))
    }

    async fn complete(&self, run_id: DbId, completion: &Completion) -> Result<bool, EngineError> {
        Ok(self.finish(run_id, RunStatus::Succeeded, None, None, completion))
    }

    async fn skip_running(
        &self,
        run_id: DbId,
        reason: SkipReason,
        completion: &Completion,
    ) -> Result<bool, EngineError> {
        Ok(self.finish(run_id, RunStatus::Skipped, Some(reason), None, completion))
    }

    async fn fail_running(
        &self,
        run_id: DbId,
        kind: FailureKind,
        detail: &str,
        completion: &Completion,
    ) -> Result<bool, EngineError> {
        Ok(self.finish(
            run_id,
            RunStatus::Failed,
            None,
            Some((kind, detail)),
            completion,
        ))
    }

    async fn find(&self, run_id: DbId) -> Result<Option<Run>, EngineError> {
        Ok(self.get(run_id))
    }

    async fn list_redeliverable(
        &self,
        older_than: Timestamp,
        limit: i64,
    ) -> Result<Vec<DbId>, EngineError> {
        let mut queued: Vec<&Run> = Vec::new();
        let runs = lock(&self.runs);
        queued.extend(
            runs.iter()
                .filter(|r| r.status_id == RunStatus::Queued.id() && r.created_at < older_than),
        );
        queued.sort_by_key(|r| r.created_at);
        Ok(queued
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|r| r.id)
            .collect())
    }

    async fn fail_stuck(&self, claimed_before: Timestamp) -> Result<Vec<Run>, EngineError> {
        let mut runs = lock(&self.runs);
        let now = Utc::now();
        let mut swept = Vec::new();
        for run in runs.iter_mut().filter(|r| {
            r.status_id == RunStatus::Running.id()
                && r.claimed_at.is_some_and(|at| at < claimed_before)
        }) {
            run.status_id = RunStatus::Failed.id();
            run.error = Some(FailureKind::Timeout.as_str().to_string());
            run.error_details = Some("Run exceeded the operational timeout".into());
            run.completed_at = Some(now);
            run.updated_at = now;
            swept.push(run.clone());
        }
        Ok(swept)
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Hash-chained audit sink, chained per tenant like the database writer.
#[derive(Default)]
pub struct MemoryAuditWriter {
    entries: Mutex<Vec<AutomationAuditLog>>,
}

impl MemoryAuditWriter {
    pub fn entries(&self) -> Vec<AutomationAuditLog> {
        lock(&self.entries).clone()
    }

    pub fn for_run(&self, run_id: DbId) -> Vec<AutomationAuditLog> {
        lock(&self.entries)
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditWriter for MemoryAuditWriter {
    async fn append(&self, entry: &CreateAuditLog) -> Result<(), EngineError> {
        let mut entries = lock(&self.entries);
        let prev = entries
            .iter()
            .rev()
            .find(|e| e.tenant_id == entry.tenant_id)
            .map(|e| e.integrity_hash.clone());
        let integrity_hash = compute_integrity_hash(prev.as_deref(), &entry.canonical_data());
        let id = entries.len() as DbId + 1;
        entries.push(AutomationAuditLog {
            id,
            run_id: entry.run_id,
            tenant_id: entry.tenant_id.clone(),
            entity_id: entry.entity_id.clone(),
            trigger_type: entry.trigger_type.clone(),
            rule_id: entry.rule_id.clone(),
            status_id: entry.status_id,
            reason: entry.reason.clone(),
            error: entry.error.clone(),
            fingerprint_hash: entry.fingerprint_hash.clone(),
            before_snapshot: entry.before_snapshot.clone(),
            after_snapshot: entry.after_snapshot.clone(),
            details_json: entry.details_json.clone(),
            integrity_hash,
            created_at: Utc::now(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Settings toggles; anything not enabled is OFF.
#[derive(Default)]
pub struct StaticSettings {
    enabled: Mutex<HashSet<(String, String)>>,
}

impl StaticSettings {
    pub fn set(&self, tenant_id: &str, rule_id: &str, enabled: bool) {
        let key = (tenant_id.to_string(), rule_id.to_string());
        let mut set = lock(&self.enabled);
        if enabled {
            set.insert(key);
        } else {
            set.remove(&key);
        }
    }
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn is_enabled(&self, tenant_id: &str, rule_id: &str) -> Result<bool, CollaboratorError> {
        Ok(lock(&self.enabled).contains(&(tenant_id.to_string(), rule_id.to_string())))
    }
}

/// Entitlements that allow every tenant unless denied. Counts calls.
#[derive(Default)]
pub struct StaticEntitlements {
    denied: Mutex<HashSet<String>>,
    caps: Mutex<HashMap<String, i64>>,
    calls: AtomicUsize,
}

impl StaticEntitlements {
    pub fn deny(&self, tenant_id: &str) {
        lock(&self.denied).insert(tenant_id.to_string());
    }

    pub fn set_cap(&self, tenant_id: &str, cap: i64) {
        lock(&self.caps).insert(tenant_id.to_string(), cap);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Entitlements for StaticEntitlements {
    async fn entitlement(
        &self,
        tenant_id: &str,
        _rule_id: &str,
    ) -> Result<Entitlement, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Entitlement {
            allowed: !lock(&self.denied).contains(tenant_id),
            daily_cap: lock(&self.caps).get(tenant_id).copied(),
        })
    }
}

/// Catalog content keyed by `(tenant, entity)`.
#[derive(Default)]
pub struct MemoryContentSource {
    content: Mutex<HashMap<(String, String), EntityContent>>,
    unavailable: Mutex<bool>,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl MemoryContentSource {
    pub fn put(&self, tenant_id: &str, content: EntityContent) {
        lock(&self.content).insert((tenant_id.to_string(), content.entity_id.clone()), content);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *lock(&self.unavailable) = unavailable;
    }

    /// Fail the next `times` fetches, then serve content again.
    pub fn fail_next(&self, times: usize) {
        self.failures_left.store(times, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for MemoryContentSource {
    async fn fetch(
        &self,
        tenant_id: &str,
        entity_id: &str,
    ) -> Result<Option<EntityContent>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted_failure = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure || *lock(&self.unavailable) {
            return Err(CollaboratorError::Unavailable {
                service: "catalog",
                message: "catalog offline".into(),
            });
        }
        Ok(lock(&self.content)
            .get(&(tenant_id.to_string(), entity_id.to_string()))
            .cloned())
    }
}

/// Generator that replays scripted results, then falls back to a default.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<GenerationResponse, GenerationError>>>,
    fallback: Mutex<Result<GenerationResponse, GenerationError>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(GenerationResponse::Items {
                items: vec![confident_item("faq_1", "Yes")],
            })),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedGenerator {
    /// Queue the next result.
    pub fn push(&self, result: Result<GenerationResponse, GenerationError>) {
        lock(&self.script).push_back(result);
    }

    /// Result returned once the script is exhausted.
    pub fn set_fallback(&self, result: Result<GenerationResponse, GenerationError>) {
        *lock(&self.fallback) = result;
    }

    /// Sleep this long before answering (to exercise the attempt timeout).
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        _entity_id: &str,
        _context: &ContentContext,
    ) -> Result<GenerationResponse, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = lock(&self.script).pop_front();
        scripted.unwrap_or_else(|| lock(&self.fallback).clone())
    }
}

/// A confident, grounded item for scripting generator responses.
pub fn confident_item(key: &str, value: &str) -> GeneratedItem {
    GeneratedItem {
        key: key.into(),
        value: Some(Value::String(value.into())),
        confidence: 0.95,
        source_fields_used: vec!["description".into()],
    }
}

/// Generated-content store holding the last write per entity and surface.
#[derive(Default)]
pub struct MemoryContentStore {
    written: Mutex<HashMap<(String, String, String), Vec<GeneratedItem>>>,
    fail_writes: Mutex<bool>,
    writes: AtomicUsize,
}

impl MemoryContentStore {
    pub fn set_fail_writes(&self, fail: bool) {
        *lock(&self.fail_writes) = fail;
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn items(&self, tenant_id: &str, entity_id: &str, surface: &str) -> Vec<GeneratedItem> {
        lock(&self.written)
            .get(&(tenant_id.into(), entity_id.into(), surface.into()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn snapshot(
        &self,
        tenant_id: &str,
        entity_id: &str,
        surface: &str,
    ) -> Result<Option<Value>, CollaboratorError> {
        Ok(lock(&self.written)
            .get(&(tenant_id.into(), entity_id.into(), surface.into()))
            .and_then(|items| serde_json::to_value(items).ok()))
    }

    async fn write_generated_content(
        &self,
        tenant_id: &str,
        entity_id: &str,
        surface: &str,
        items: &[GeneratedItem],
    ) -> Result<(), CollaboratorError> {
        if *lock(&self.fail_writes) {
            return Err(CollaboratorError::Unavailable {
                service: "content store",
                message: "write refused".into(),
            });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        lock(&self.written).insert(
            (tenant_id.into(), entity_id.into(), surface.into()),
            items.to_vec(),
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A fully wired engine over in-memory doubles.
pub struct TestHarness {
    pub store: Arc<MemoryRunStore>,
    pub audit: Arc<MemoryAuditWriter>,
    pub settings: Arc<StaticSettings>,
    pub entitlements: Arc<StaticEntitlements>,
    pub content: Arc<MemoryContentSource>,
    pub generator: Arc<ScriptedGenerator>,
    pub content_store: Arc<MemoryContentStore>,
    pub bus: Arc<EventBus>,
    pub ctx: EngineContext,
    pub queue: RunQueue,
    pub receiver: RunReceiver,
}

impl TestHarness {
    /// Built-in rules, fast retry pacing.
    pub fn new() -> Self {
        let config = EngineConfig {
            generation_timeout: Duration::from_millis(200),
            generation_retry_delay: Duration::from_millis(1),
            trigger_retry_delay: Duration::from_millis(1),
            ..EngineConfig::default()
        };
        Self::with(RuleCatalog::builtin(), config)
    }

    pub fn with(rules: RuleCatalog, config: EngineConfig) -> Self {
        let store = Arc::new(MemoryRunStore::default());
        let audit = Arc::new(MemoryAuditWriter::default());
        let settings = Arc::new(StaticSettings::default());
        let entitlements = Arc::new(StaticEntitlements::default());
        let content = Arc::new(MemoryContentSource::default());
        let generator = Arc::new(ScriptedGenerator::default());
        let content_store = Arc::new(MemoryContentStore::default());
        let bus = Arc::new(EventBus::default());
        let (queue, receiver) = queue::channel(config.queue_capacity);

        let ctx = EngineContext {
            rules: Arc::new(rules),
            store: store.clone(),
            audit: audit.clone(),
            settings: settings.clone(),
            entitlements: entitlements.clone(),
            content: content.clone(),
            generator: generator.clone(),
            content_store: content_store.clone(),
            bus: bus.clone(),
            config,
        };

        Self {
            store,
            audit,
            settings,
            entitlements,
            content,
            generator,
            content_store,
            bus,
            ctx,
            queue,
            receiver,
        }
    }

    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(self.ctx.clone(), self.queue.clone())
    }

    pub fn executor(&self, worker_id: &str) -> Executor {
        Executor::new(self.ctx.clone(), worker_id)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
