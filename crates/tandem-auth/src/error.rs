//! Session authentication error types.
//!
//! This module defines every error the session subsystem can surface, from
//! credential validation failures to transient store problems.
//!
//! The variants split into three groups that callers handle differently:
//!
//! - **Terminal**: the credential pair is unusable and the client must log in
//!   again (`CredentialMalformed`, `CredentialRevoked`, `PlatformMismatch`,
//!   `RefreshTokenInvalid`, `DeviceMismatch`).
//! - **Refreshable**: `CredentialExpired`; the client should exchange its
//!   long-lived credential for a new short-lived one.
//! - **Transient**: `Storage` and `StoreTimeout`; retry with backoff, never
//!   interpret as revocation.

use std::fmt;

/// Errors that can occur while issuing, validating, refreshing or revoking
/// sessions.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The short-lived credential could not be parsed or its signature did not verify.
    #[error("Malformed credential: {message}")]
    CredentialMalformed {
        /// Description of why the credential is malformed.
        message: String,
    },

    /// The short-lived credential is past its embedded expiry.
    #[error("Credential expired")]
    CredentialExpired,

    /// The short-lived credential is no longer the live one for its session.
    ///
    /// Covers logout, forced revocation and supersession by a later login or
    /// refresh.
    #[error("Credential revoked")]
    CredentialRevoked,

    /// The request's device class does not match the one bound to the credential.
    #[error("Platform mismatch: credential issued for '{expected}', request claims '{actual}'")]
    PlatformMismatch {
        /// Device class embedded in the credential.
        expected: String,
        /// Device class claimed by the request.
        actual: String,
    },

    /// The long-lived credential is unknown, expired or already revoked.
    #[error("Refresh token invalid")]
    RefreshTokenInvalid,

    /// The long-lived credential was presented from a different device.
    #[error("Device mismatch")]
    DeviceMismatch,

    /// The request lacks credentials entirely.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of what is missing.
        message: String,
    },

    /// The authenticated subject may not perform the action.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of why access is forbidden.
        message: String,
    },

    /// The request is missing required metadata or is otherwise invalid.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The credential store failed. Retryable.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// A credential store operation exceeded its time budget. Retryable.
    #[error("Store operation '{operation}' timed out")]
    StoreTimeout {
        /// The store operation that timed out.
        operation: &'static str,
    },

    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `CredentialMalformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::CredentialMalformed {
            message: message.into(),
        }
    }

    /// Creates a new `PlatformMismatch` error.
    #[must_use]
    pub fn platform_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::PlatformMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the session is unusable and the client must log in again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CredentialMalformed { .. }
                | Self::CredentialRevoked
                | Self::PlatformMismatch { .. }
                | Self::RefreshTokenInvalid
                | Self::DeviceMismatch
        )
    }

    /// Returns `true` if the operation may succeed when retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::StoreTimeout { .. })
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::CredentialMalformed { .. }
                | Self::CredentialExpired
                | Self::CredentialRevoked
                | Self::PlatformMismatch { .. }
                | Self::RefreshTokenInvalid
                | Self::DeviceMismatch
                | Self::Unauthorized { .. }
                | Self::Forbidden { .. }
                | Self::InvalidRequest { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CredentialMalformed { .. }
            | Self::CredentialExpired
            | Self::CredentialRevoked
            | Self::PlatformMismatch { .. } => ErrorCategory::Credential,
            Self::RefreshTokenInvalid => ErrorCategory::Refresh,
            Self::DeviceMismatch => ErrorCategory::Security,
            Self::Unauthorized { .. } => ErrorCategory::Authentication,
            Self::Forbidden { .. } => ErrorCategory::Authorization,
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::Storage { .. } | Self::StoreTimeout { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the stable wire code for this error.
    ///
    /// Clients branch on this value; it never changes for a given variant.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CredentialMalformed { .. } => "credential_malformed",
            Self::CredentialExpired => "credential_expired",
            Self::CredentialRevoked => "credential_revoked",
            Self::PlatformMismatch { .. } => "platform_mismatch",
            Self::RefreshTokenInvalid => "refresh_token_invalid",
            Self::DeviceMismatch => "device_mismatch",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Storage { .. } => "store_unavailable",
            Self::StoreTimeout { .. } => "store_timeout",
            Self::Configuration { .. } => "server_error",
            Self::Internal { .. } => "server_error",
        }
    }
}

/// Categories of session errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Short-lived credential validation failures.
    Credential,
    /// Long-lived credential exchange failures.
    Refresh,
    /// Security-relevant events (device binding violations).
    Security,
    /// Missing credentials.
    Authentication,
    /// Permission checks.
    Authorization,
    /// Request validation errors.
    Validation,
    /// Credential store errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credential => write!(f, "credential"),
            Self::Refresh => write!(f, "refresh"),
            Self::Security => write!(f, "security"),
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::malformed("bad signature");
        assert_eq!(err.to_string(), "Malformed credential: bad signature");

        let err = AuthError::CredentialExpired;
        assert_eq!(err.to_string(), "Credential expired");

        let err = AuthError::platform_mismatch("web", "mobile-ios");
        assert_eq!(
            err.to_string(),
            "Platform mismatch: credential issued for 'web', request claims 'mobile-ios'"
        );

        let err = AuthError::StoreTimeout { operation: "get" };
        assert_eq!(err.to_string(), "Store operation 'get' timed out");
    }

    #[test]
    fn test_terminal_and_transient_are_disjoint() {
        let all = [
            AuthError::malformed("x"),
            AuthError::CredentialExpired,
            AuthError::CredentialRevoked,
            AuthError::platform_mismatch("a", "b"),
            AuthError::RefreshTokenInvalid,
            AuthError::DeviceMismatch,
            AuthError::unauthorized("x"),
            AuthError::forbidden("x"),
            AuthError::invalid_request("x"),
            AuthError::storage("x"),
            AuthError::StoreTimeout { operation: "set" },
            AuthError::configuration("x"),
            AuthError::internal("x"),
        ];
        for err in &all {
            assert!(
                !(err.is_terminal() && err.is_transient()),
                "{err} is both terminal and transient"
            );
        }
    }

    #[test]
    fn test_expired_is_neither_terminal_nor_transient() {
        let err = AuthError::CredentialExpired;
        assert!(!err.is_terminal());
        assert!(!err.is_transient());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_store_errors_are_transient_server_errors() {
        let err = AuthError::storage("connection refused");
        assert!(err.is_transient());
        assert!(err.is_server_error());
        assert_eq!(err.category(), ErrorCategory::Infrastructure);

        let err = AuthError::StoreTimeout { operation: "get" };
        assert!(err.is_transient());
        assert_eq!(err.error_code(), "store_timeout");
    }

    #[test]
    fn test_device_mismatch_is_security_category() {
        let err = AuthError::DeviceMismatch;
        assert!(err.is_terminal());
        assert_eq!(err.category(), ErrorCategory::Security);
        assert_eq!(err.error_code(), "device_mismatch");
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Credential.to_string(), "credential");
        assert_eq!(ErrorCategory::Security.to_string(), "security");
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
