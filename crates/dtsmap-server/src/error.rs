//! Error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use dtsmap_projects::{StoreError, SyncError};
use serde_json::json;
use tracing::error;

/// An error rendered as `{"error": "..."}` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::InvalidProjectName(_)
            | StoreError::UnknownRepo(_)
            | StoreError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
            StoreError::ProjectNotFound(_) | StoreError::FileNotFound(_) => StatusCode::NOT_FOUND,
            StoreError::ProjectExists(_) => StatusCode::CONFLICT,
            StoreError::Io { .. } | StoreError::Metadata { .. } | StoreError::Pattern(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError::new(status, err.to_string())
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let status = match &err {
            SyncError::AlreadyRunning(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::internal(format!("analysis task failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "{}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
