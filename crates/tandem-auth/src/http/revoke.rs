//! Administrative forced revocation.
//!
//! ```text
//! POST /auth/admin/revoke
//! Authorization: Bearer <admin slc>
//! X-Device-Class: web
//!
//! {"subject_id": "42", "device_class": "mobile-ios"}
//! ```
//!
//! Without `device_class` every session of the subject is revoked.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::middleware::AdminAuth;
use crate::types::{DeviceClass, SubjectId};

use super::HttpState;

/// Forced revocation request body.
#[derive(Debug, Deserialize)]
pub struct ForceRevokeBody {
    /// Subject whose sessions are revoked.
    pub subject_id: SubjectId,
    /// Single device class to revoke; all when absent.
    #[serde(default)]
    pub device_class: Option<DeviceClass>,
}

/// Result of a forced revocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceRevokeResponse {
    /// Subject whose sessions were revoked.
    pub subject_id: SubjectId,
    /// Device classes that had a session.
    pub revoked: Vec<DeviceClass>,
}

/// Forced revocation handler.
pub async fn force_revoke_handler(
    State(state): State<HttpState>,
    admin: AdminAuth,
    Json(body): Json<ForceRevokeBody>,
) -> Result<Json<ForceRevokeResponse>, AuthError> {
    let revoked = state
        .service
        .force_revoke(&body.subject_id, body.device_class.as_ref())
        .await?;

    tracing::info!(
        admin = %admin.subject_id,
        subject_id = %body.subject_id,
        revoked = revoked.len(),
        "administrative revocation"
    );

    Ok(Json(ForceRevokeResponse {
        subject_id: body.subject_id,
        revoked,
    }))
}
