#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use autopilot_api::config::ServerConfig;
use autopilot_api::routes;
use autopilot_api::state::AppState;
use autopilot_core::rules::RuleCatalog;
use autopilot_engine::queue::{self, RunReceiver};
use autopilot_engine::store::{PgAuditWriter, PgRunStore, PgSettings};
use autopilot_engine::testing::{
    MemoryContentSource, MemoryContentStore, ScriptedGenerator, StaticEntitlements,
};
use autopilot_engine::{EngineConfig, EngineContext, Evaluator, Executor};
use autopilot_events::EventBus;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        rules_path: None,
        embedded_workers: false,
    }
}

/// The router plus handles on the in-memory collaborators and the queue.
///
/// Runs, settings and audit entries go to the test database; external
/// services are doubles so tests can script them.
pub struct TestApp {
    pub router: Router,
    pub ctx: EngineContext,
    pub receiver: RunReceiver,
    pub entitlements: Arc<StaticEntitlements>,
    pub content: Arc<MemoryContentSource>,
    pub generator: Arc<ScriptedGenerator>,
    pub content_store: Arc<MemoryContentStore>,
}

impl TestApp {
    /// Execute a queued Run the way an embedded worker would.
    pub fn executor(&self) -> Executor {
        Executor::new(self.ctx.clone(), "test-worker")
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool.
///
/// Mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack production uses.
pub fn build_test_app(pool: PgPool) -> TestApp {
    let config = test_config();
    let rules = Arc::new(RuleCatalog::builtin());
    let engine_config = EngineConfig {
        generation_timeout: Duration::from_secs(2),
        generation_retry_delay: Duration::from_millis(1),
        ..EngineConfig::default()
    };

    let entitlements = Arc::new(StaticEntitlements::default());
    let content = Arc::new(MemoryContentSource::default());
    let generator = Arc::new(ScriptedGenerator::default());
    let content_store = Arc::new(MemoryContentStore::default());

    let ctx = EngineContext {
        rules: Arc::clone(&rules),
        store: Arc::new(PgRunStore::new(pool.clone())),
        audit: Arc::new(PgAuditWriter::new(pool.clone())),
        settings: Arc::new(PgSettings::new(pool.clone(), Arc::clone(&rules))),
        entitlements: entitlements.clone(),
        content: content.clone(),
        generator: generator.clone(),
        content_store: content_store.clone(),
        bus: Arc::new(EventBus::default()),
        config: engine_config,
    };
    let (run_queue, receiver) = queue::channel(64);

    let state = AppState {
        pool,
        config: Arc::new(config),
        rules,
        evaluator: Evaluator::new(ctx.clone(), run_queue),
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
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

    TestApp {
        router,
        ctx,
        receiver,
        entitlements,
        content,
        generator,
        content_store,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn send_json(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> Response {
    app.oneshot(
        Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send_json(app, Method::POST, uri, body).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send_json(app, Method::PUT, uri, body).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
