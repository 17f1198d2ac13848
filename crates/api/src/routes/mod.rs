pub mod health;
pub mod runs;
pub mod tenants;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /triggers                                        ingest (POST)
/// /rules                                           rule catalog (GET)
///
/// /runs                                            list (GET)
/// /runs/{id}                                       get (GET)
/// /runs/{id}/audit                                 audit entries for a run (GET)
///
/// /tenants/{tenant_id}/automation/settings         list (GET)
/// /tenants/{tenant_id}/automation/settings/{rule}  toggle (PUT)
/// /tenants/{tenant_id}/automation/usage/{rule}     successful runs today (GET)
/// /tenants/{tenant_id}/automation/summary          aggregate counts (GET)
/// /tenants/{tenant_id}/automation/audit            query (GET)
/// /tenants/{tenant_id}/automation/audit/verify     hash chain check (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/triggers", post(handlers::triggers::ingest_trigger))
        .route("/rules", get(handlers::rules::list_rules))
        .nest("/runs", runs::router())
        .nest("/tenants/{tenant_id}/automation", tenants::router())
}
