//! Error types for Clashdoor
//!
//! Every failure a coordinator or gate operation can report, plus the
//! status-code mapping used when an error is returned to a session.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Main error type for Clashdoor operations
#[derive(Debug, thiserror::Error)]
pub enum ClashError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClashError {
    /// HTTP-style status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::InvalidArgument(_) => 400,
            Self::PermissionDenied(_) => 403,
            Self::IllegalState(_) => 422,
            Self::Storage(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// Short machine-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::IllegalState(_) => "ILLEGAL_STATE",
            Self::Storage(_) => "STORAGE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Build the response body sent back to a session
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            status: self.status_code(),
            error: self.label().to_string(),
            message: self.to_string(),
            timestamp: Utc::now(),
            path: None,
        }
    }
}

/// Error body returned over the command channel
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status: u16,
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Command that failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorResponse {
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl From<std::io::Error> for ClashError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for ClashError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArgument(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for ClashError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<bson::de::Error> for ClashError {
    fn from(err: bson::de::Error) -> Self {
        Self::Storage(format!("BSON decode error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClashError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Internal(format!("WebSocket error: {}", err))
    }
}

/// Result type alias for Clashdoor operations
pub type Result<T> = std::result::Result<T, ClashError>;
