use axum::routing::get;
use axum::Router;

use crate::handlers::runs;
use crate::state::AppState;

/// Routes mounted at `/runs`.
///
/// ```text
/// GET    /                -> list_runs
/// GET    /{id}            -> get_run
/// GET    /{id}/audit      -> get_run_audit
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(runs::list_runs))
        .route("/{id}", get(runs::get_run))
        .route("/{id}/audit", get(runs::get_run_audit))
}
