//! Login endpoint handler.
//!
//! # Request Format
//!
//! ```text
//! POST /auth/login
//! Content-Type: application/json
//! X-Device-Class: web
//! X-Device-Fingerprint: fp-a
//!
//! {"username": "alice", "password": "..."}
//! ```

use async_trait::async_trait;
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::middleware::RequestDevice;
use crate::session::LoginRequest;
use crate::types::{LongLivedCredential, ShortLivedCredential, SubjectId};

use super::{HttpState, credential_cookie};

/// Password check performed before a session is issued.
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    /// Returns the subject for valid credentials, `None` otherwise.
    async fn verify(&self, username: &str, password: &str) -> AuthResult<Option<SubjectId>>;
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginBody {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

/// Credentials returned by a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Authenticated subject.
    pub subject_id: SubjectId,
    /// Short-lived credential, sent as `Authorization: Bearer`.
    pub slc: ShortLivedCredential,
    /// Long-lived credential, sent in the refresh header.
    pub llc: LongLivedCredential,
    /// Always `Bearer`.
    pub token_type: String,
    /// Short-lived credential lifetime in seconds.
    pub slc_ttl: u64,
    /// Long-lived credential lifetime in seconds.
    pub llc_ttl: u64,
    /// Absolute expiry of the short-lived credential.
    #[serde(with = "time::serde::rfc3339")]
    pub slc_expires_at: OffsetDateTime,
}

/// Login endpoint handler.
///
/// Verifies the password, then issues a session for the claimed device
/// class. A previous session of the same device class stops working.
pub async fn login_handler(
    State(state): State<HttpState>,
    device: RequestDevice,
    Json(body): Json<LoginBody>,
) -> Result<impl IntoResponse, AuthError> {
    let transport = &state.service.config().transport;
    let device_fingerprint = device.require_fingerprint(&transport.fingerprint_header)?;

    let subject_id = state
        .verifier
        .verify(&body.username, &body.password)
        .await?
        .ok_or_else(|| {
            tracing::info!(device_class = %device.device_class, "login rejected");
            AuthError::unauthorized("invalid username or password")
        })?;

    let issued = state
        .service
        .login(LoginRequest {
            subject_id: subject_id.clone(),
            device_class: device.device_class,
            device_fingerprint,
            origin_address: device.origin_address,
        })
        .await?;

    let mut headers = HeaderMap::new();
    if let Some(cookie) = credential_cookie(
        &state.service.config().cookie,
        issued.slc.as_str(),
        issued.slc_ttl.as_secs(),
    )? {
        headers.insert(header::SET_COOKIE, cookie);
    }

    Ok((
        headers,
        Json(LoginResponse {
            subject_id,
            slc: issued.slc,
            llc: issued.llc,
            token_type: "Bearer".to_string(),
            slc_ttl: issued.slc_ttl.as_secs(),
            llc_ttl: issued.llc_ttl.as_secs(),
            slc_expires_at: issued.slc_expires_at,
        }),
    ))
}
