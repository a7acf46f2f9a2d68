//! Error types shared by the position store and the HTTP handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Failure against the persistence store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors surfaced to HTTP callers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Payload did not decode into a position report.
    #[error("Invalid JSON")]
    InvalidJson,

    /// Saving a new fix failed.
    #[error("Failed to save position")]
    Save(#[source] StoreError),

    #[error("Failed to fetch history")]
    FetchHistory(#[source] StoreError),

    #[error("Failed to fetch last position")]
    FetchLastPosition(#[source] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidJson => StatusCode::BAD_REQUEST,
            ApiError::Save(_) | ApiError::FetchHistory(_) | ApiError::FetchLastPosition(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
