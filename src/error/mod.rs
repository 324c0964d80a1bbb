use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Backend error: {0}")]
    Api(#[from] ApiError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),
}

/// Durable local storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Backend API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API error: {status} - {}", detail.as_deref().unwrap_or(body.as_str()))]
    Api {
        status: u16,
        /// `detail` field of the error body, when the backend sent one.
        detail: Option<String>,
        body: String,
    },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    /// Backend-provided detail message, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Api {
                detail: Some(detail),
                ..
            } if !detail.trim().is_empty() => Some(detail.as_str()),
            _ => None,
        }
    }

    /// Message to show the user: the backend detail, or `fallback` when absent.
    pub fn user_message(&self, fallback: &str) -> String {
        self.detail().unwrap_or(fallback).to_string()
    }

    /// HTTP status of a non-success response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Misuse of a flow's state machine or locally rejected input
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("Validation failed: {field} is required")]
    Validation { field: String },

    #[error("Cannot {action} while {from}")]
    InvalidTransition { from: String, action: String },

    #[error("Not signed in")]
    NotAuthenticated,
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for backend calls
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for flow transitions
pub type FlowResult<T> = Result<T, FlowError>;
