use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{history::HistoryError, snapshots::SnapshotError};

/// Service failures mapped onto HTTP responses with a JSON `error` body.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// The durable store misbehaved; we are only the messenger.
    UpstreamFailed(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::UpstreamFailed(m) => (StatusCode::BAD_GATEWAY, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<HistoryError> for ApiError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::InvalidRange => Self::BadRequest(e.to_string()),
            HistoryError::QueryFailed(_) => Self::UpstreamFailed(e.to_string()),
        }
    }
}

impl From<SnapshotError> for ApiError {
    fn from(e: SnapshotError) -> Self {
        match e {
            SnapshotError::EmptyMessageSet => Self::BadRequest(e.to_string()),
            SnapshotError::NotFound => Self::NotFound(e.to_string()),
            SnapshotError::Persistence(_) => Self::UpstreamFailed(e.to_string()),
        }
    }
}
