//! # tandem-auth
//!
//! Dual-token session authentication.
//!
//! This crate provides:
//! - A short-lived signed credential checked on every request
//! - A long-lived opaque credential exchanged for new short-lived ones
//! - One active session per subject and device class
//! - Self logout and administrative forced revocation
//! - Axum extractors and handlers for the session endpoints
//!
//! ## Overview
//!
//! Liveness lives in a shared [`store::CredentialStore`]. A short-lived
//! credential is accepted only while its signature verifies, it has not
//! expired, and the store mirror for its session holds exactly that
//! credential. Logging in again, refreshing, logging out or being revoked
//! replaces or removes the mirror, which ends the previous credential at once.
//!
//! ## Modules
//!
//! - [`config`] - Session configuration
//! - [`error`] - Error taxonomy
//! - [`types`] - Identity and credential types
//! - [`store`] - Credential store trait, in-memory store and typed facade
//! - [`token`] - Short-lived credential signing and verification
//! - [`session`] - Issue, validate, refresh, revoke
//! - [`device`] - Device metadata from request headers
//! - [`middleware`] - Axum extractors and error responses
//! - [`http`] - Axum handlers for the session endpoints

pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod http;
pub mod middleware;
pub mod session;
pub mod store;
pub mod token;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use http::{HttpState, PasswordVerifier};
pub use middleware::{AdminAuth, AuthState, OptionalSessionAuth, RequestDevice, SessionAuth};
pub use session::{LoginRequest, RefreshRequest, SessionService};
pub use store::{CredentialStore, MemoryCredentialStore, SessionStore, StoreKey};
pub use token::{CredentialSigner, JwtCodec, JwtError, SessionClaims, SigningAlgorithm, SigningKey};
pub use types::{
    DeviceClass, DeviceFingerprint, IssuedSession, LongLivedCredential, RefreshedCredential,
    SessionKey, SessionSummary, ShortLivedCredential, SubjectId, ValidatedSession,
};

/// Type alias for session authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tandem_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::middleware::{AdminAuth, AuthState, OptionalSessionAuth, SessionAuth};
    pub use crate::session::{LoginRequest, RefreshRequest, SessionService};
    pub use crate::store::{CredentialStore, MemoryCredentialStore};
    pub use crate::types::{
        DeviceClass, DeviceFingerprint, LongLivedCredential, ShortLivedCredential, SubjectId,
        ValidatedSession,
    };
}
