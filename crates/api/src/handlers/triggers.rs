//! Handlers for trigger ingestion.

use autopilot_core::trigger::RawTriggerEvent;
use autopilot_engine::ingest::{self, IngestResponse};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/triggers
///
/// Normalize one trigger and run the Evaluation Gate. Returns 202 once the
/// gate has run, whatever it decided; `reason` carries the skip reason.
/// A payload that cannot be normalized gets 400 with
/// `reason: "malformed_event"`.
pub async fn ingest_trigger(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> AppResult<impl IntoResponse> {
    let raw: RawTriggerEvent = match serde_json::from_value(body) {
        Ok(raw) => raw,
        Err(e) => {
            let data = IngestResponse::malformed(e.to_string());
            return Ok((StatusCode::BAD_REQUEST, Json(DataResponse { data })));
        }
    };

    let response = ingest::ingest(&state.evaluator, &raw).await?;

    let status = if response.accepted {
        tracing::info!(
            run_id = ?response.run_id,
            reason = ?response.reason,
            "Trigger evaluated",
        );
        StatusCode::ACCEPTED
    } else {
        StatusCode::BAD_REQUEST
    };

    Ok((status, Json(DataResponse { data: response })))
}
