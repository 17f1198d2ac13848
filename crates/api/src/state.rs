use std::sync::Arc;

use autopilot_core::rules::RuleCatalog;
use autopilot_engine::Evaluator;

use crate::config::ServerConfig;

/// Shared application state available to all handlers via axum's `State`
/// extractor.
///
/// Cheap to clone (all inner fields are `Arc`-wrapped or pool handles).
#[derive(Clone)]
pub struct AppState {
    pub pool: autopilot_db::DbPool,
    pub config: Arc<ServerConfig>,
    pub rules: Arc<RuleCatalog>,
    /// Runs the Evaluation Gate for ingested triggers.
    pub evaluator: Evaluator,
}
