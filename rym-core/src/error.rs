use reqwest::StatusCode;
use thiserror::Error;

use crate::credentials::StorageError;

/// Errors surfaced by every client-side operation.
///
/// Nothing here is retried automatically. Callers render `user_message()`
/// and decide whether to re-run (config loading) or prompt a re-login
/// (`SessionExpired`).
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("runtime configuration unavailable: {0}")]
    ConfigUnavailable(String),
    #[error("not signed in")]
    Unauthenticated,
    #[error("session expired")]
    SessionExpired,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("backend error (HTTP {status}): {message}")]
    Backend { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("credential storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ClientError {
    /// Map a non-success status to the matching error kind.
    ///
    /// `resource` names what was requested, for `NotFound`/`Conflict`.
    pub fn from_status(status: StatusCode, resource: &str, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ClientError::SessionExpired,
            StatusCode::NOT_FOUND => ClientError::NotFound(resource.to_string()),
            StatusCode::CONFLICT => ClientError::Conflict(resource.to_string()),
            _ => ClientError::Backend {
                status: status.as_u16(),
                message: error_message_from_body(body),
            },
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// Short text suitable for a notification or an inline error line.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::ConfigUnavailable(_) => {
                "The service is unavailable right now. Try again later.".to_string()
            }
            ClientError::Unauthenticated => "Sign in to do that.".to_string(),
            ClientError::SessionExpired => "Your session has expired. Sign in again.".to_string(),
            ClientError::NotFound(_) => "Album not found.".to_string(),
            ClientError::Conflict(_) => "Already done.".to_string(),
            ClientError::InvalidInput(msg) => msg.clone(),
            ClientError::Backend { status, .. } => format!("Server error ({status})."),
            ClientError::MalformedResponse(_) => "Unexpected response from server.".to_string(),
            ClientError::Network(_) => "Network error. Check your connection.".to_string(),
            ClientError::Storage(_) => "Could not access saved sign-in.".to_string(),
        }
    }
}

/// Backend error bodies look like `{"error": "..."}`; fall back to the raw text.
fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}
