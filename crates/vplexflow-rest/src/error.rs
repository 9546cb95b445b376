//! REST client error types and HTTP status mapping

use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::LazyLock;
use thiserror::Error;
use vplexflow_core::VplexError;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z:.,0-9/_-]+").expect("static sanitize pattern"));

#[derive(Error, Debug)]
pub enum RestError {
    #[error("Invalid connection settings: {0}")]
    InvalidConfig(String),

    #[error("Could not read CA certificate {path}: {source}")]
    CaCertificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, RestError>;

impl From<RestError> for VplexError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::InvalidConfig(msg) => VplexError::Validation(msg),
            other => VplexError::Connection(other.to_string()),
        }
    }
}

/// Error body returned by the management server
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}

/// Collapse anything outside `A-Za-z:.,0-9/_-` to a single space
pub fn sanitize_message(message: &str) -> String {
    UNSAFE_CHARS.replace_all(message, " ").trim().to_string()
}

/// Translate a non-success response into the shared error taxonomy
pub(crate) fn status_error(status: StatusCode, resource: &str, body: &str) -> VplexError {
    let raw = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.to_string());
    let message = sanitize_message(&raw);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => VplexError::Connection(format!(
            "authentication failed ({}): {}",
            status.as_u16(),
            message
        )),
        StatusCode::NOT_FOUND => VplexError::not_found(resource),
        StatusCode::CONFLICT => VplexError::conflict(resource, message),
        StatusCode::BAD_REQUEST => VplexError::validation(message),
        _ => VplexError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Failures below HTTP are always connection problems
pub(crate) fn transport_error(err: reqwest::Error) -> VplexError {
    if err.is_timeout() {
        VplexError::Connection(format!("request timed out: {}", err))
    } else {
        VplexError::Connection(err.to_string())
    }
}
