//! Session introspection handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AuthError;
use crate::middleware::{AdminAuth, SessionAuth};
use crate::types::{DeviceClass, SessionSummary, SubjectId};

use super::HttpState;

/// The caller's own session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentSession {
    /// Authenticated subject.
    pub subject_id: SubjectId,
    /// Device class of the session.
    pub device_class: DeviceClass,
    /// Expiry of the presented credential.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Sessions of a subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionList {
    /// Subject the sessions belong to.
    pub subject_id: SubjectId,
    /// Live sessions, one per device class.
    pub sessions: Vec<SessionSummary>,
}

/// Returns the identity behind the presented credential.
pub async fn current_session_handler(SessionAuth(session): SessionAuth) -> Json<CurrentSession> {
    Json(CurrentSession {
        subject_id: session.subject_id,
        device_class: session.device_class,
        expires_at: session.expires_at,
    })
}

/// Lists the caller's sessions across device classes.
pub async fn list_own_sessions_handler(
    State(state): State<HttpState>,
    SessionAuth(session): SessionAuth,
) -> Result<Json<SessionList>, AuthError> {
    let sessions = state.service.list_sessions(&session.subject_id).await?;
    Ok(Json(SessionList {
        subject_id: session.subject_id,
        sessions,
    }))
}

/// Lists another subject's sessions. Administrators only.
pub async fn list_subject_sessions_handler(
    State(state): State<HttpState>,
    _admin: AdminAuth,
    Path(subject_id): Path<String>,
) -> Result<Json<SessionList>, AuthError> {
    let subject_id = SubjectId::parse(subject_id)?;
    let sessions = state.service.list_sessions(&subject_id).await?;
    Ok(Json(SessionList {
        subject_id,
        sessions,
    }))
}
