//! Client error types.

use std::fmt;

use thiserror::Error;

/// Why the agent gave up on the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReauthReason {
    /// The short-lived credential expired before a refresh was attempted.
    Expired,
    /// The server refused the refresh (e.g. `refresh_token_invalid`).
    Rejected {
        /// Server error code.
        code: String,
    },
    /// Every retry failed with a network error or timeout.
    RetriesExhausted,
}

impl fmt::Display for ReauthReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => write!(f, "session expired"),
            Self::Rejected { code } => write!(f, "refresh rejected ({code})"),
            Self::RetriesExhausted => write!(f, "refresh retries exhausted"),
        }
    }
}

/// Errors raised by the session agent and its transport.
///
/// Cloneable so one refresh outcome can be handed to every waiting caller.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// No session is installed.
    #[error("not logged in")]
    NotAuthenticated,

    /// The session is gone; the user has to log in again.
    #[error("re-authentication required: {0}")]
    ReauthRequired(ReauthReason),

    /// The server answered with a non-retryable error.
    #[error("server rejected the request: {code}: {message}")]
    Rejected { code: String, message: String },

    /// The server answered with a retryable error (5xx, store unavailable).
    #[error("server unavailable: {message}")]
    Unavailable { message: String },

    /// The request never got an answer.
    #[error("network error: {0}")]
    Network(String),

    /// A refresh attempt took longer than the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The response could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Local credential persistence failed.
    #[error("credential storage error: {0}")]
    Storage(String),
}

impl ClientError {
    /// Returns `true` if the same request may succeed when retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Network(_) | Self::Timeout
        )
    }

    /// Server error code, if the server produced one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
