//! HTTP handlers for the session endpoints.
//!
//! # Routes
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | POST | `/auth/login` | [`login::login_handler`] |
//! | POST | `/auth/refresh` | [`refresh::refresh_handler`] |
//! | POST | `/auth/logout` | [`logout::logout_handler`] |
//! | GET | `/auth/session` | [`sessions::current_session_handler`] |
//! | GET | `/auth/sessions` | [`sessions::list_own_sessions_handler`] |
//! | POST | `/auth/admin/revoke` | [`revoke::force_revoke_handler`] |
//! | GET | `/auth/admin/sessions/{subject_id}` | [`sessions::list_subject_sessions_handler`] |
//! | GET | `/healthz` | [`health::health_handler`] |
//!
//! Credentials travel as `Authorization: Bearer <slc>` and in the configured
//! refresh header; device class and fingerprint always travel in their own
//! headers.

pub mod health;
pub mod login;
pub mod logout;
pub mod refresh;
pub mod revoke;
pub mod sessions;

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::HeaderValue,
    routing::{get, post},
};

use cookie::{Cookie, CookieBuilder, SameSite};
use time::Duration;

use crate::AuthResult;
use crate::config::CookieConfig;
use crate::error::AuthError;
use crate::middleware::AuthState;
use crate::session::SessionService;

pub use login::{PasswordVerifier, login_handler};
pub use logout::logout_handler;
pub use refresh::refresh_handler;
pub use revoke::force_revoke_handler;

// =============================================================================
// State Types
// =============================================================================

/// State shared by the session endpoints.
#[derive(Clone)]
pub struct HttpState {
    /// Session service.
    pub service: SessionService,
    /// Password check used by the login endpoint.
    pub verifier: Arc<dyn PasswordVerifier>,
}

impl HttpState {
    /// Creates a new HTTP state.
    pub fn new(service: SessionService, verifier: Arc<dyn PasswordVerifier>) -> Self {
        Self { service, verifier }
    }
}

impl FromRef<HttpState> for AuthState {
    fn from_ref(state: &HttpState) -> Self {
        AuthState::new(state.service.clone())
    }
}

/// Builds the router for all session endpoints.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/auth/login", post(login::login_handler))
        .route("/auth/refresh", post(refresh::refresh_handler))
        .route("/auth/logout", post(logout::logout_handler))
        .route("/auth/session", get(sessions::current_session_handler))
        .route("/auth/sessions", get(sessions::list_own_sessions_handler))
        .route("/auth/admin/revoke", post(revoke::force_revoke_handler))
        .route(
            "/auth/admin/sessions/{subject_id}",
            get(sessions::list_subject_sessions_handler),
        )
        .route("/healthz", get(health::health_handler))
        .with_state(state)
}

/// Builds a `Set-Cookie` value carrying the short-lived credential, when
/// cookie auth is enabled.
pub(crate) fn credential_cookie(
    config: &CookieConfig,
    value: &str,
    max_age_secs: u64,
) -> AuthResult<Option<HeaderValue>> {
    if !config.enabled {
        return Ok(None);
    }
    let max_age = Duration::seconds(i64::try_from(max_age_secs).unwrap_or(i64::MAX));
    let cookie = base_cookie(config, value.to_string()).max_age(max_age).build();
    encode_cookie(&cookie).map(Some)
}

/// Builds a `Set-Cookie` value that clears the credential cookie, when cookie
/// auth is enabled.
pub(crate) fn removal_cookie(config: &CookieConfig) -> AuthResult<Option<HeaderValue>> {
    if !config.enabled {
        return Ok(None);
    }
    let mut cookie = base_cookie(config, String::new()).build();
    cookie.make_removal();
    encode_cookie(&cookie).map(Some)
}

fn base_cookie(config: &CookieConfig, value: String) -> CookieBuilder<'static> {
    Cookie::build((config.name.clone(), value))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .path("/")
}

fn encode_cookie(cookie: &Cookie<'_>) -> AuthResult<HeaderValue> {
    HeaderValue::from_str(&cookie.encoded().to_string()).map_err(|e| {
        tracing::error!(
            cookie = %cookie.name(),
            error = %e,
            "credential cookie is not a valid header"
        );
        AuthError::internal(format!("invalid Set-Cookie value: {e}"))
    })
}
