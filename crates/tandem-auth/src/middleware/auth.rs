//! Short-lived credential extractors.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use tandem_auth::middleware::{AuthState, SessionAuth};
//!
//! async fn protected_handler(SessionAuth(session): SessionAuth) -> String {
//!     format!("Hello, {}!", session.subject_id)
//! }
//!
//! let app = Router::new()
//!     .route("/protected", get(protected_handler))
//!     .with_state(auth_state);
//! ```

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, header::COOKIE, request::Parts},
};

use cookie::Cookie;

use crate::config::CookieConfig;
use crate::device;
use crate::error::AuthError;
use crate::session::SessionService;
use crate::types::ValidatedSession;

// =============================================================================
// Auth State
// =============================================================================

/// State required by the session extractors.
///
/// Include it in your application state and expose it via `FromRef`.
///
/// # Example
///
/// ```ignore
/// #[derive(Clone)]
/// struct AppState {
///     auth: AuthState,
///     // ... other state
/// }
///
/// impl FromRef<AppState> for AuthState {
///     fn from_ref(state: &AppState) -> Self {
///         state.auth.clone()
///     }
/// }
/// ```
#[derive(Clone)]
pub struct AuthState {
    /// Session service used for validation.
    pub service: SessionService,
}

impl AuthState {
    /// Creates a new auth state.
    #[must_use]
    pub fn new(service: SessionService) -> Self {
        Self { service }
    }
}

// =============================================================================
// Session Auth Extractor
// =============================================================================

/// Axum extractor that requires a live short-lived credential.
///
/// This extractor:
/// 1. Reads the credential from `Authorization: Bearer` (or the configured
///    cookie when enabled and no header is present)
/// 2. Reads the claimed device class and optional fingerprint headers
/// 3. Validates the credential against the session store
///
/// # Errors
///
/// Rejects with the `AuthError` from validation. A missing credential is
/// `Unauthorized`; a missing device class header is `InvalidRequest`.
pub struct SessionAuth(pub ValidatedSession);

impl<S> FromRequestParts<S> for SessionAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        let config = auth_state.service.config();

        // 1. Credential
        let token = extract_credential(parts, &config.cookie)
            .ok_or_else(|| AuthError::unauthorized("Missing Authorization header"))?;

        // 2. Device metadata
        let device_class = device::device_class(&parts.headers, &config.transport)?;
        let fingerprint = device::device_fingerprint(&parts.headers, &config.transport)?;

        // 3. Validate
        let session = auth_state
            .service
            .validate_request(&token, &device_class, fingerprint.as_ref())
            .await?;

        tracing::debug!(
            subject_id = %session.subject_id,
            device_class = %session.device_class,
            "credential validated"
        );

        Ok(SessionAuth(session))
    }
}

// =============================================================================
// Optional Session Auth Extractor
// =============================================================================

/// Axum extractor for public routes that personalise when a session exists.
///
/// Yields `None` when no credential is sent or when the credential does not
/// validate. Transient store errors are still propagated.
///
/// # Example
///
/// ```ignore
/// async fn handler(OptionalSessionAuth(session): OptionalSessionAuth) -> String {
///     match session {
///         Some(s) => format!("Hello, {}!", s.subject_id),
///         None => "Hello, anonymous!".to_string(),
///     }
/// }
/// ```
pub struct OptionalSessionAuth(pub Option<ValidatedSession>);

impl<S> FromRequestParts<S> for OptionalSessionAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);

        let has_auth_header = parts.headers.get(AUTHORIZATION).is_some();
        let has_cookie_token =
            auth_state.service.config().cookie.enabled && parts.headers.get(COOKIE).is_some();

        if !has_auth_header && !has_cookie_token {
            return Ok(OptionalSessionAuth(None));
        }

        match SessionAuth::from_request_parts(parts, state).await {
            Ok(SessionAuth(session)) => Ok(OptionalSessionAuth(Some(session))),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring invalid credential on public route");
                Ok(OptionalSessionAuth(None))
            }
        }
    }
}

// =============================================================================
// Credential Helpers
// =============================================================================

/// Reads the short-lived credential from the `Authorization` header, falling
/// back to the cookie when cookie auth is enabled.
fn extract_credential(parts: &Parts, cookie_config: &CookieConfig) -> Option<String> {
    if let Some(auth_header) = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        return auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(ToString::to_string);
    }
    extract_token_from_cookie(parts, cookie_config)
}

/// Extract token from cookie if cookie auth is enabled.
fn extract_token_from_cookie(parts: &Parts, cookie_config: &CookieConfig) -> Option<String> {
    if !cookie_config.enabled {
        return None;
    }

    let cookie_header = parts.headers.get(COOKIE)?.to_str().ok()?;
    let token = Cookie::split_parse_encoded(cookie_header)
        .filter_map(Result::ok)
        .find(|c| c.name() == cookie_config.name && !c.value().is_empty())?
        .value()
        .to_string();

    tracing::debug!(cookie_name = %cookie_config.name, "Token extracted from cookie");
    Some(token)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn cookie_config(enabled: bool) -> CookieConfig {
        CookieConfig {
            enabled,
            name: "tandem_slc".to_string(),
        }
    }

    #[test]
    fn test_bearer_header() {
        let p = parts(&[("authorization", "Bearer abc.def.ghi")]);
        assert_eq!(
            extract_credential(&p, &cookie_config(false)).as_deref(),
            Some("abc.def.ghi")
        );
    }

    #[test]
    fn test_non_bearer_scheme_is_ignored() {
        let p = parts(&[("authorization", "Basic dXNlcjpwYXNz")]);
        assert_eq!(extract_credential(&p, &cookie_config(true)), None);
    }

    #[test]
    fn test_cookie_fallback_only_when_enabled() {
        let p = parts(&[("cookie", "theme=dark; tandem_slc=abc.def.ghi")]);
        assert_eq!(extract_credential(&p, &cookie_config(false)), None);
        assert_eq!(
            extract_credential(&p, &cookie_config(true)).as_deref(),
            Some("abc.def.ghi")
        );
    }

    #[test]
    fn test_cookie_value_is_percent_decoded() {
        let p = parts(&[("cookie", "tandem_slc=a%20b; tandem_slc_other=x")]);
        assert_eq!(
            extract_credential(&p, &cookie_config(true)).as_deref(),
            Some("a b")
        );
    }

    #[test]
    fn test_empty_cookie_is_ignored() {
        let p = parts(&[("cookie", "tandem_slc=")]);
        assert_eq!(extract_credential(&p, &cookie_config(true)), None);
    }

    #[test]
    fn test_header_wins_over_cookie() {
        let p = parts(&[
            ("authorization", "Bearer from-header"),
            ("cookie", "tandem_slc=from-cookie"),
        ]);
        assert_eq!(
            extract_credential(&p, &cookie_config(true)).as_deref(),
            Some("from-header")
        );
    }
}
