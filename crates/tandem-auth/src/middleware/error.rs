//! Error response handling for session middleware and handlers.
//!
//! Every error renders as `{ "error": code, "message": text, "retryable": bool }`.
//! Clients branch on `error`; the codes are stable.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// JSON error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code.
    pub error: String,
    /// Human-readable description.
    pub message: String,
    /// Whether retrying the same request may succeed.
    pub retryable: bool,
}

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_code(&self);

        if status.is_server_error() {
            tracing::error!(
                category = %self.category(),
                error = %self,
                "session request failed"
            );
        }

        // Internal details stay in the log
        let message = match &self {
            AuthError::Configuration { .. } | AuthError::Internal { .. } => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.error_code().to_string(),
            message,
            retryable: self.is_transient(),
        };

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            let www_auth = build_www_authenticate_header(&self, &body.message);
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }
        if status == StatusCode::SERVICE_UNAVAILABLE {
            headers.insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }

        (status, headers, Json(body)).into_response()
    }
}

/// Maps an error to its HTTP status.
#[must_use]
pub fn status_code(error: &AuthError) -> StatusCode {
    match error {
        AuthError::CredentialMalformed { .. }
        | AuthError::CredentialExpired
        | AuthError::CredentialRevoked
        | AuthError::PlatformMismatch { .. }
        | AuthError::RefreshTokenInvalid
        | AuthError::DeviceMismatch
        | AuthError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
        AuthError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        AuthError::Storage { .. } | AuthError::StoreTimeout { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Builds a `WWW-Authenticate: Bearer` challenge (RFC 6750).
fn build_www_authenticate_header(error: &AuthError, message: &str) -> String {
    if matches!(error, AuthError::Unauthorized { .. }) {
        return "Bearer".to_string();
    }
    let description: String = message
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect();
    format!(
        "Bearer error=\"invalid_token\", error_description=\"{}\"",
        description
    )
}
