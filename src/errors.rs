use crate::services::{
    ingest::IngestError, metadata_store::StoreError, remote::RemoteError,
};
use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        AppError::new(err.status(), err.to_string())
    }
}

/// Remote failures are reported as server-side faults.
impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::not_found("file not found"),
            other => AppError::internal(other.to_string()),
        }
    }
}

/// Malformed or incomplete JSON bodies are caller faults.
impl From<JsonRejection> for AppError {
    fn from(rej: JsonRejection) -> Self {
        AppError::bad_request(rej.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rej: QueryRejection) -> Self {
        AppError::bad_request(rej.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_errors_map_to_status() {
        let err = AppError::from(StoreError::NotFound("file_v3_x".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "file not found");

        let err = AppError::from(IngestError::MissingField("file"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = AppError::from(RemoteError::Auth("code=10014".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
