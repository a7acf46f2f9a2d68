//! POST /position: accept a fix, persist it, then fan it out.

use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;

use crate::error::ApiError;
use crate::positions::PositionReport;
use crate::state::AppState;
use crate::ws::broadcast::broadcast_position;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// POST /position
///
/// The body is decoded by hand rather than through the `Json` extractor so
/// that any malformed payload, with or without a JSON content type, is a 400.
/// The fix is persisted before it is broadcast; if saving fails nobody sees it.
pub async fn report_position(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let report: PositionReport = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected position payload");
        ApiError::InvalidJson
    })?;

    let position = report.into_position();

    state
        .store
        .run(move |store| store.insert(&position))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to save position");
            ApiError::Save(e)
        })?;

    let outcome = broadcast_position(&state.connections, &position);

    tracing::info!(
        lat = position.latitude,
        lng = position.longitude,
        viewers = outcome.delivered,
        "Received position"
    );

    Ok(Json(StatusResponse { status: "ok" }))
}
