//! Logout endpoint handler.
//!
//! ```text
//! POST /auth/logout
//! X-Refresh-Token: <llc>
//! X-Device-Class: web
//!
//! {"subject_id": "42"}
//! ```
//!
//! Always answers `204 No Content` unless the request itself is malformed or
//! the store is unavailable. Logging out twice is not an error.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::device;
use crate::error::AuthError;
use crate::middleware::RequestDevice;
use crate::types::SubjectId;

use super::{HttpState, removal_cookie};

/// Logout request body.
#[derive(Debug, Deserialize)]
pub struct LogoutBody {
    /// Subject the session belongs to.
    pub subject_id: SubjectId,
}

/// Logout endpoint handler.
pub async fn logout_handler(
    State(state): State<HttpState>,
    request_headers: HeaderMap,
    device: RequestDevice,
    Json(body): Json<LogoutBody>,
) -> Result<impl IntoResponse, AuthError> {
    let config = state.service.config();
    let llc = device::refresh_credential(&request_headers, &config.transport)?;

    state
        .service
        .logout(&body.subject_id, &device.device_class, &llc)
        .await?;

    let mut headers = HeaderMap::new();
    if let Some(expired) = removal_cookie(&config.cookie)? {
        headers.insert(header::SET_COOKIE, expired);
    }

    Ok((StatusCode::NO_CONTENT, headers))
}
