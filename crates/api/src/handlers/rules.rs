use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/rules
///
/// The rule catalog this process was started with.
pub async fn list_rules(State(state): State<AppState>) -> impl IntoResponse {
    Json(DataResponse {
        data: state.rules.rules().to_vec(),
    })
}
