//! Unified error types for Cronhook using thiserror.
//!
//! Provides consistent error handling across all components.

use thiserror::Error;
use uuid::Uuid;

/// The unified error type for Cronhook operations
#[derive(Error, Debug)]
pub enum Error {
    // Schedule errors
    #[error("Invalid schedule: {message}")]
    InvalidSchedule { message: String },

    // Header errors (non-fatal at execution time; surfaced on validation)
    #[error("Invalid headers: {message}")]
    InvalidHeaders { message: String },

    // Lookup errors
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    // Manual trigger errors
    #[error("Job is not active: {job_id}")]
    Inactive { job_id: Uuid },

    #[error("Job is already running: {job_id}")]
    AlreadyRunning { job_id: Uuid },

    // Rate limiting
    #[error("Rate limit exceeded: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    // Execution errors
    #[error("Network error: {code}{}", .message.as_ref().map(|m| format!(" - {m}")).unwrap_or_default())]
    Transport {
        code: &'static str,
        message: Option<String>,
    },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    // Persistence errors
    #[error("Store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Validation errors
    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // Serialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    // Shutdown errors
    #[error("Shutdown in progress")]
    ShutdownInProgress,

    // Generic wrapped error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid schedule error
    pub fn invalid_schedule(message: impl Into<String>) -> Self {
        Error::InvalidSchedule {
            message: message.into(),
        }
    }

    /// Create an invalid headers error
    pub fn invalid_headers(message: impl Into<String>) -> Self {
        Error::InvalidHeaders {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Error::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Error::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Create a store error with source
    pub fn store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is retryable by the HTTP invoker
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { .. } => true,
            Error::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::InvalidSchedule { .. }
            | Error::InvalidHeaders { .. }
            | Error::InvalidInput { .. }
            | Error::Inactive { .. }
            | Error::AlreadyRunning { .. } => 400,
            Error::RateLimited { .. } => 429,
            Error::ShutdownInProgress => 503,
            _ => 500,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidSchedule { .. } => "INVALID_SCHEDULE",
            Error::InvalidHeaders { .. } => "INVALID_HEADERS",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Inactive { .. } => "JOB_INACTIVE",
            Error::AlreadyRunning { .. } => "ALREADY_RUNNING",
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::Transport { .. } => "NETWORK_ERROR",
            Error::Http { .. } => "HTTP_ERROR",
            Error::Store { .. } => "STORE_ERROR",
            Error::InvalidInput { .. } => "INVALID_INPUT",
            Error::Configuration { .. } => "CONFIG_ERROR",
            Error::Serialization { .. } => "SERIALIZATION_ERROR",
            Error::Internal { .. } => "INTERNAL_ERROR",
            Error::ShutdownInProgress => "SHUTDOWN",
            Error::Other(_) => "UNKNOWN_ERROR",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type alias for Cronhook operations
pub type Result<T> = std::result::Result<T, Error>;
