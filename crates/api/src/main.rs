use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use autopilot_api::config::ServerConfig;
use autopilot_api::routes;
use autopilot_api::state::AppState;
use autopilot_connectors::ConnectorsConfig;
use autopilot_engine::ingest::TriggerListener;
use autopilot_engine::{queue, EngineConfig, Evaluator};
use autopilot_events::EventBus;
use autopilot_worker::bootstrap::{self, Collaborators};
use autopilot_worker::telemetry;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    telemetry::init_tracing("autopilot_api=debug,autopilot_engine=debug,tower_http=debug");

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    let engine_config = EngineConfig::from_env().expect("Invalid engine configuration");
    let connectors = ConnectorsConfig::from_env().expect("Invalid collaborator configuration");
    let rules = Arc::new(
        bootstrap::load_rules(config.rules_path.as_deref())
            .expect("Failed to load automation rules"),
    );
    tracing::info!(
        host = %config.host,
        port = %config.port,
        rules = rules.rules().len(),
        embedded_workers = config.embedded_workers,
        "Loaded server configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = autopilot_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    autopilot_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    autopilot_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Engine ---
    let collaborators = Collaborators::http(&connectors).expect("Failed to build HTTP clients");
    let event_bus = Arc::new(EventBus::default());
    let ctx = bootstrap::engine_context(
        pool.clone(),
        Arc::clone(&rules),
        collaborators,
        Arc::clone(&event_bus),
        engine_config.clone(),
    );

    let cancel = CancellationToken::new();
    let mut background = Vec::new();

    // Without embedded workers, admitted Runs wait in the table for a
    // standalone worker's queue poller.
    let run_queue = if config.embedded_workers {
        let (run_queue, receiver) = queue::channel(engine_config.queue_capacity);
        let name = format!("api-{}", std::process::id());
        background.extend(bootstrap::spawn_background(
            &ctx,
            run_queue.clone(),
            receiver,
            &name,
            &cancel,
        ));
        run_queue
    } else {
        queue::RunQueue::durable_only()
    };

    let evaluator = Evaluator::new(ctx, run_queue);

    // Catalog events published in-process go through the same gate.
    let listener = TriggerListener::new(evaluator.clone());
    let listener_bus = Arc::clone(&event_bus);
    let listener_cancel = cancel.clone();
    background.push(tokio::spawn(async move {
        listener.run(&listener_bus, listener_cancel).await;
    }));
    tracing::info!(tasks = background.len(), "Engine tasks started");

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        rules,
        evaluator,
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining engine tasks");
    cancel.cancel();
    bootstrap::join_with_grace(background, Duration::from_secs(30)).await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
