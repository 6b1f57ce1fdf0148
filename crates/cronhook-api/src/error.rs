//! Error handling for HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cronhook_core::error::Error as CoreError;
use serde::Serialize;
use std::collections::HashMap;

/// API error response format
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// Error code for client handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, String>>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

/// HTTP error wrapper for Axum
pub struct HttpError {
    pub status: StatusCode,
    pub body: ApiError,
}

impl HttpError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiError::new(code, message),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn with_details(mut self, details: HashMap<String, String>) -> Self {
        self.body.details = Some(details);
        self
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<CoreError> for HttpError {
    fn from(err: CoreError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match &err {
            CoreError::RateLimited { retry_after_secs } => {
                let mut details = HashMap::new();
                details.insert("retryAfter".to_string(), format!("{retry_after_secs:.1}"));
                HttpError::new(status, err.error_code(), "Too many manual triggers")
                    .with_details(details)
            }
            CoreError::Store { message, .. } => {
                tracing::error!("Store error: {}", message);
                HttpError::internal_error("A store error occurred")
            }
            CoreError::Internal { message } => {
                tracing::error!("Internal error: {}", message);
                HttpError::internal_error("An internal error occurred")
            }
            _ => HttpError::new(status, err.error_code(), err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for HttpError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details: HashMap<String, String> = errors
            .field_errors()
            .iter()
            .map(|(field, errs)| {
                let message = errs
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .collect::<Vec<_>>()
                    .join("; ");
                (field.to_string(), message)
            })
            .collect();
        HttpError::bad_request("Validation failed").with_details(details)
    }
}

/// Result type for HTTP handlers
pub type HttpResult<T> = Result<T, HttpError>;
