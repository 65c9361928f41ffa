//! Request metadata extractors.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRef, FromRequestParts};
use axum::http::request::Parts;

use crate::device;
use crate::error::AuthError;
use crate::types::{DeviceClass, DeviceFingerprint};

use super::auth::AuthState;

/// Device metadata claimed by a request.
///
/// The device class header is required; fingerprint is optional here (the
/// handlers that need it enforce it). The origin address comes from the
/// forwarding header, falling back to the peer address when the server runs
/// with connect info.
#[derive(Debug, Clone)]
pub struct RequestDevice {
    /// Claimed device class.
    pub device_class: DeviceClass,
    /// Claimed fingerprint, if sent.
    pub device_fingerprint: Option<DeviceFingerprint>,
    /// Client address, advisory.
    pub origin_address: Option<String>,
}

impl RequestDevice {
    /// Returns the fingerprint or an `InvalidRequest` naming the header.
    pub fn require_fingerprint(&self, header: &str) -> Result<DeviceFingerprint, AuthError> {
        self.device_fingerprint
            .clone()
            .ok_or_else(|| AuthError::invalid_request(format!("missing {header} header")))
    }
}

impl<S> FromRequestParts<S> for RequestDevice
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        let transport = &auth_state.service.config().transport;

        let origin_address = device::origin_address(&parts.headers, transport).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(Self {
            device_class: device::device_class(&parts.headers, transport)?,
            device_fingerprint: device::device_fingerprint(&parts.headers, transport)?,
            origin_address,
        })
    }
}
