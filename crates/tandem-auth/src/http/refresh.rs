//! Refresh endpoint handler.
//!
//! # Request Format
//!
//! ```text
//! POST /auth/refresh
//! Content-Type: application/json
//! X-Refresh-Token: <llc>
//! X-Device-Class: web
//! X-Device-Fingerprint: fp-a
//!
//! {"subject_id": "42"}
//! ```
//!
//! The device class and fingerprint are taken from the headers, never from
//! the (possibly expired) short-lived credential.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::device;
use crate::error::AuthError;
use crate::middleware::RequestDevice;
use crate::session::RefreshRequest;
use crate::types::{LongLivedCredential, ShortLivedCredential, SubjectId};

use super::{HttpState, credential_cookie};

/// Refresh request body.
#[derive(Debug, Deserialize)]
pub struct RefreshBody {
    /// Subject the session belongs to.
    pub subject_id: SubjectId,
}

/// Credentials returned by a successful refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// New short-lived credential.
    pub slc: ShortLivedCredential,
    /// Always `Bearer`.
    pub token_type: String,
    /// Short-lived credential lifetime in seconds.
    pub slc_ttl: u64,
    /// Absolute expiry of the short-lived credential.
    #[serde(with = "time::serde::rfc3339")]
    pub slc_expires_at: OffsetDateTime,
    /// Replacement long-lived credential, present when rotation is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llc: Option<LongLivedCredential>,
}

/// Refresh endpoint handler.
pub async fn refresh_handler(
    State(state): State<HttpState>,
    request_headers: HeaderMap,
    device: RequestDevice,
    Json(body): Json<RefreshBody>,
) -> Result<impl IntoResponse, AuthError> {
    let config = state.service.config();
    let llc = device::refresh_credential(&request_headers, &config.transport)?;
    let device_fingerprint = device.require_fingerprint(&config.transport.fingerprint_header)?;

    let refreshed = state
        .service
        .refresh(RefreshRequest {
            subject_id: body.subject_id,
            device_class: device.device_class,
            device_fingerprint,
            llc,
            origin_address: device.origin_address,
        })
        .await?;

    let mut headers = HeaderMap::new();
    if let Some(cookie) = credential_cookie(
        &config.cookie,
        refreshed.slc.as_str(),
        refreshed.slc_ttl.as_secs(),
    )? {
        headers.insert(header::SET_COOKIE, cookie);
    }

    Ok((
        headers,
        Json(RefreshResponse {
            slc: refreshed.slc,
            token_type: "Bearer".to_string(),
            slc_ttl: refreshed.slc_ttl.as_secs(),
            slc_expires_at: refreshed.slc_expires_at,
            llc: refreshed.llc,
        }),
    ))
}
