//! Builds an [`EngineContext`] from configuration and starts the engine's
//! background tasks.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use autopilot_connectors::{
    ConnectorsConfig, HttpCatalog, HttpContentStore, HttpEntitlements, HttpGenerator,
};
use autopilot_core::collaborators::{ContentSource, ContentStore, Entitlements, Generator};
use autopilot_core::error::CoreError;
use autopilot_core::rules::RuleCatalog;
use autopilot_db::DbPool;
use autopilot_engine::pool::{self, WorkerPool};
use autopilot_engine::queue::{RunQueue, RunReceiver};
use autopilot_engine::store::{PgAuditWriter, PgRunStore, PgSettings};
use autopilot_engine::{sweep, EngineConfig, EngineContext};
use autopilot_events::EventBus;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Load the rule catalog: the JSON file at `path`, or the built-in rules.
pub fn load_rules(path: Option<&Path>) -> Result<RuleCatalog, CoreError> {
    let Some(path) = path else {
        return Ok(RuleCatalog::builtin());
    };
    let json = std::fs::read_to_string(path).map_err(|e| {
        CoreError::Validation(format!(
            "Cannot read rule catalog {}: {e}",
            path.display()
        ))
    })?;
    RuleCatalog::from_json(&json)
}

/// The external services the engine calls.
pub struct Collaborators {
    pub entitlements: Arc<dyn Entitlements>,
    pub content: Arc<dyn ContentSource>,
    pub generator: Arc<dyn Generator>,
    pub content_store: Arc<dyn ContentStore>,
}

impl Collaborators {
    /// HTTP clients for every collaborator.
    pub fn http(config: &ConnectorsConfig) -> Result<Self, CoreError> {
        let client = config.http_client()?;

        Ok(Self {
            entitlements: Arc::new(HttpEntitlements::new(
                client.clone(),
                config.entitlement_api_url.clone(),
            )),
            content: Arc::new(HttpCatalog::new(
                client.clone(),
                config.catalog_api_url.clone(),
            )),
            generator: Arc::new(HttpGenerator::new(
                config.generation_client(),
                config.generation_api_url.clone(),
            )),
            content_store: Arc::new(HttpContentStore::new(
                client,
                config.content_api_url.clone(),
            )),
        })
    }
}

/// Postgres-backed stores plus the given collaborators.
pub fn engine_context(
    pool: DbPool,
    rules: Arc<RuleCatalog>,
    collaborators: Collaborators,
    bus: Arc<EventBus>,
    config: EngineConfig,
) -> EngineContext {
    EngineContext {
        store: Arc::new(PgRunStore::new(pool.clone())),
        audit: Arc::new(PgAuditWriter::new(pool.clone())),
        settings: Arc::new(PgSettings::new(pool, Arc::clone(&rules))),
        rules,
        entitlements: collaborators.entitlements,
        content: collaborators.content,
        generator: collaborators.generator,
        content_store: collaborators.content_store,
        bus,
        config,
    }
}

/// Spawn the worker pool, the queue poller and the stuck-run sweep.
///
/// `name` prefixes the worker ids recorded as `claimed_by`.
pub fn spawn_background(
    ctx: &EngineContext,
    queue: RunQueue,
    receiver: RunReceiver,
    name: &str,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let workers = WorkerPool::new(ctx.clone(), receiver, name);
    let redelivery = pool::run_redelivery(
        Arc::clone(&ctx.store),
        queue,
        ctx.config.queue_poll_interval,
        ctx.config.queue_redeliver_after,
        cancel.clone(),
    );

    vec![
        tokio::spawn(workers.run(cancel.clone())),
        tokio::spawn(redelivery),
        tokio::spawn(sweep::run(ctx.clone(), cancel.clone())),
    ]
}

/// Wait up to `grace` for each task to finish after cancellation.
pub async fn join_with_grace(handles: Vec<JoinHandle<()>>, grace: Duration) {
    for handle in handles {
        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Background task panicked"),
            Err(_) => tracing::warn!(grace_secs = grace.as_secs(), "Background task did not stop in time"),
        }
    }
}
