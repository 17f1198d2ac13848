use axum::routing::{get, put};
use axum::Router;

use crate::handlers::{audit, settings, usage};
use crate::state::AppState;

/// Routes mounted at `/tenants/{tenant_id}/automation`.
///
/// ```text
/// GET    /settings              -> list_settings
/// PUT    /settings/{rule_id}    -> update_setting
/// GET    /usage/{rule_id}       -> get_usage
/// GET    /summary               -> get_summary
/// GET    /audit                 -> list_audit
/// GET    /audit/verify          -> verify_audit
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/settings", get(settings::list_settings))
        .route("/settings/{rule_id}", put(settings::update_setting))
        .route("/usage/{rule_id}", get(usage::get_usage))
        .route("/summary", get(usage::get_summary))
        .route("/audit", get(audit::list_audit))
        .route("/audit/verify", get(audit::verify_audit))
}
