//! Error types and error handling for the application
//!
//! This module defines custom error types that can be converted to HTTP responses.
//! All errors implement `IntoResponse` to provide consistent error formatting.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
///
/// All errors that can occur in the application are represented by this enum.
/// Each variant implements automatic conversion to HTTP responses via `IntoResponse`.
#[derive(Error, Debug)]
pub enum AppError {
    /// A required request field is missing or empty
    #[error("{0}")]
    Validation(String),

    /// No record with the given ID exists in the store
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Error occurred while reading, writing, or parsing the backing file
    #[error("Storage error: {0}")]
    Store(#[from] crate::services::StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::RecordNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        tracing::error!(status = status.as_u16(), error = %error_message, "Request failed");

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
