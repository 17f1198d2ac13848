use std::sync::Arc;
use std::time::Duration;

use autopilot_connectors::ConnectorsConfig;
use autopilot_engine::config::env_path;
use autopilot_engine::{queue, EngineConfig};
use autopilot_events::EventBus;
use autopilot_worker::bootstrap::{self, Collaborators};
use autopilot_worker::telemetry;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    telemetry::init_tracing("autopilot_worker=debug,autopilot_engine=debug");

    // --- Configuration ---
    let engine_config = EngineConfig::from_env().expect("Invalid engine configuration");
    let connectors = ConnectorsConfig::from_env().expect("Invalid collaborator configuration");
    let rules_path = env_path("AUTOMATION_RULES_PATH");
    let rules = Arc::new(
        bootstrap::load_rules(rules_path.as_deref()).expect("Failed to load automation rules"),
    );
    tracing::info!(
        rules = rules.rules().len(),
        concurrency = engine_config.worker_concurrency,
        "Loaded worker configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = autopilot_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    autopilot_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    // --- Engine ---
    let collaborators = Collaborators::http(&connectors).expect("Failed to build HTTP clients");
    let bus = Arc::new(EventBus::default());
    let (run_queue, receiver) = queue::channel(engine_config.queue_capacity);
    let ctx = bootstrap::engine_context(pool, rules, collaborators, bus, engine_config);

    let cancel = CancellationToken::new();
    let name = format!("worker-{}", std::process::id());
    let handles = bootstrap::spawn_background(&ctx, run_queue, receiver, &name, &cancel);
    tracing::info!(name = %name, "Worker started");

    shutdown_signal().await;

    cancel.cancel();
    bootstrap::join_with_grace(handles, Duration::from_secs(30)).await;
    tracing::info!("Worker shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, draining workers"),
        () = terminate => tracing::info!("Received SIGTERM, draining workers"),
    }
}
