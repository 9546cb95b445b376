//! Error taxonomy shared by every vplexflow crate

use thiserror::Error;

/// Errors surfaced by resource clients, the step executor and the orchestrator
#[derive(Error, Debug)]
pub enum VplexError {
    /// Network failure or rejected credentials
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Resource exists but with parameters that differ from the request
    #[error("Conflict on {resource}: {message}")]
    Conflict { resource: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Timed out waiting for {resource} after {attempts} polls")]
    Timeout { resource: String, attempts: u32 },

    /// Malformed input, rejected before anything reaches the array
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Workflow cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VplexError {
    pub fn conflict(resource: impl ToString, message: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl ToString) -> Self {
        Self::NotFound(resource.to_string())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Short label used in reports and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Conflict { .. } => "conflict",
            Self::NotFound(_) => "not-found",
            Self::Timeout { .. } => "timeout",
            Self::Validation(_) => "validation",
            Self::Api { .. } => "api",
            Self::Cancelled => "cancelled",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, VplexError>;
