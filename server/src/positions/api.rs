//! Read-only REST endpoints for the viewer page.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::ApiError;
use crate::positions::Position;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MapConfigResponse {
    #[serde(rename = "mapStyle")]
    pub map_style: String,
}

/// GET /api/history
/// Every stored fix, oldest first.
pub async fn history(State(state): State<AppState>) -> Result<Json<Vec<Position>>, ApiError> {
    let positions = state.store.run(|store| store.list_all()).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to query history");
        ApiError::FetchHistory(e)
    })?;

    Ok(Json(positions))
}

/// GET /api/last-position
/// The latest fix, or JSON `null` when nothing has been recorded.
pub async fn last_position(
    State(state): State<AppState>,
) -> Result<Json<Option<Position>>, ApiError> {
    let position = state.store.run(|store| store.last_one()).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to query last position");
        ApiError::FetchLastPosition(e)
    })?;

    Ok(Json(position))
}

/// GET /api/config
pub async fn map_config(State(state): State<AppState>) -> Json<MapConfigResponse> {
    Json(MapConfigResponse {
        map_style: state.map_style.clone(),
    })
}
