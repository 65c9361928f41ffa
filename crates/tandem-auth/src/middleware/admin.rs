//! Admin authentication extractor.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::post};
//! use tandem_auth::middleware::AdminAuth;
//!
//! async fn admin_handler(admin: AdminAuth) -> String {
//!     format!("Hello admin: {}!", admin.subject_id)
//! }
//! ```

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;

use crate::error::AuthError;
use crate::types::{DeviceClass, SubjectId};

use super::auth::{AuthState, SessionAuth};

/// A validated session whose subject is listed in `admin_subjects`.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// The administrator's subject.
    pub subject_id: SubjectId,
    /// Device class the administrator is using.
    pub device_class: DeviceClass,
}

impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // 1. Live session
        let SessionAuth(session) = SessionAuth::from_request_parts(parts, state).await?;

        // 2. Admin list
        let auth_state = AuthState::from_ref(state);
        if !auth_state
            .service
            .config()
            .is_admin(session.subject_id.as_str())
        {
            tracing::warn!(
                subject_id = %session.subject_id,
                "Admin access denied: subject is not an administrator"
            );
            return Err(AuthError::forbidden("Admin access required"));
        }

        Ok(AdminAuth {
            subject_id: session.subject_id,
            device_class: session.device_class,
        })
    }
}
