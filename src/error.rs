//! Error types for the marketplace API client.
//!
//! `ClientError` is what callers of `ApiClient` see. `RefreshError` is cloned
//! to every caller queued behind a refresh, so it carries owned strings only.

use reqwest::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;
use crate::session::storage::StorageError;

/// Outcome of a failed token refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("No refresh token available")]
    NoSession,
    #[error("Refresh rejected by server ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Refresh request failed: {0}")]
    Network(String),
    #[error("Failed to parse refresh response: {0}")]
    Decode(String),
    #[error("Refresh abandoned before it settled")]
    Abandoned,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request timed out: {0}")]
    Timeout(reqwest::Error),

    #[error("HTTP request failed: {0}")]
    Network(reqwest::Error),

    /// The session could not be renewed and has been torn down.
    #[error("Session expired: {0}")]
    SessionExpired(#[from] RefreshError),

    /// A replayed request was rejected again with 401.
    #[error("Unauthorized after token refresh: {0}")]
    Unauthorized(String),

    #[error("API error ({status}): {body}")]
    Api { status: StatusCode, body: String },

    #[error("Failed to parse response: {0}")]
    Decode(String),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(err)
        } else {
            ClientError::Network(err)
        }
    }
}

impl ClientError {
    /// Whether this error tore down the session (caller should go back to login).
    pub fn is_session_terminal(&self) -> bool {
        matches!(
            self,
            ClientError::SessionExpired(_) | ClientError::Unauthorized(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_error_messages() {
        let err = RefreshError::Rejected {
            status: 400,
            body: "invalid refresh token".into(),
        };
        assert_eq!(
            err.to_string(),
            "Refresh rejected by server (400): invalid refresh token"
        );
        assert_eq!(
            RefreshError::NoSession.to_string(),
            "No refresh token available"
        );
    }

    #[test]
    fn test_session_terminal_classification() {
        assert!(ClientError::SessionExpired(RefreshError::NoSession).is_session_terminal());
        assert!(ClientError::Unauthorized("nope".into()).is_session_terminal());
        assert!(!ClientError::Api {
            status: StatusCode::FORBIDDEN,
            body: String::new()
        }
        .is_session_terminal());
        assert!(!ClientError::Decode("bad json".into()).is_session_terminal());
    }
}
