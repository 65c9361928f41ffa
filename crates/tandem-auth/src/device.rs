//! Device metadata extraction from request headers.
//!
//! Device class and fingerprint are always explicit request metadata; they are
//! never inferred from the short-lived credential.

use axum::http::HeaderMap;

use crate::AuthResult;
use crate::config::TransportConfig;
use crate::error::AuthError;
use crate::types::{DeviceClass, DeviceFingerprint, LongLivedCredential};

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Reads the claimed device class.
///
/// # Errors
/// Returns `InvalidRequest` if the header is missing or malformed.
pub fn device_class(headers: &HeaderMap, transport: &TransportConfig) -> AuthResult<DeviceClass> {
    let raw = header_str(headers, &transport.device_class_header).ok_or_else(|| {
        AuthError::invalid_request(format!(
            "missing {} header",
            transport.device_class_header
        ))
    })?;
    DeviceClass::parse(raw)
}

/// Reads the claimed device fingerprint, if any.
///
/// # Errors
/// Returns `InvalidRequest` if the header is present but malformed.
pub fn device_fingerprint(
    headers: &HeaderMap,
    transport: &TransportConfig,
) -> AuthResult<Option<DeviceFingerprint>> {
    header_str(headers, &transport.fingerprint_header)
        .map(DeviceFingerprint::parse)
        .transpose()
}

/// Reads the claimed device fingerprint, failing when absent.
///
/// # Errors
/// Returns `InvalidRequest` if the header is missing or malformed.
pub fn required_device_fingerprint(
    headers: &HeaderMap,
    transport: &TransportConfig,
) -> AuthResult<DeviceFingerprint> {
    device_fingerprint(headers, transport)?.ok_or_else(|| {
        AuthError::invalid_request(format!(
            "missing {} header",
            transport.fingerprint_header
        ))
    })
}

/// Reads the client's origin address from the forwarding header.
///
/// Only the first (client-most) entry of a comma-separated list is used.
#[must_use]
pub fn origin_address(headers: &HeaderMap, transport: &TransportConfig) -> Option<String> {
    header_str(headers, &transport.origin_header)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Reads the long-lived credential from its dedicated header.
///
/// # Errors
/// Returns `Unauthorized` if the header is missing.
pub fn refresh_credential(
    headers: &HeaderMap,
    transport: &TransportConfig,
) -> AuthResult<LongLivedCredential> {
    header_str(headers, &transport.refresh_header)
        .map(LongLivedCredential::new)
        .ok_or_else(|| {
            AuthError::unauthorized(format!("missing {} header", transport.refresh_header))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_device_class_required() {
        let transport = TransportConfig::default();
        let err = device_class(&HeaderMap::new(), &transport).unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));

        let class = device_class(&headers(&[("x-device-class", "Web")]), &transport).unwrap();
        assert_eq!(class.as_str(), "web");
    }

    #[test]
    fn test_fingerprint_optional() {
        let transport = TransportConfig::default();
        assert_eq!(device_fingerprint(&HeaderMap::new(), &transport).unwrap(), None);
        assert!(required_device_fingerprint(&HeaderMap::new(), &transport).is_err());

        let fp = device_fingerprint(&headers(&[("x-device-fingerprint", "fp-a")]), &transport)
            .unwrap()
            .unwrap();
        assert_eq!(fp.as_str(), "fp-a");
    }

    #[test]
    fn test_origin_takes_first_forwarded_entry() {
        let transport = TransportConfig::default();
        let origin = origin_address(
            &headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]),
            &transport,
        );
        assert_eq!(origin.as_deref(), Some("203.0.113.7"));
        assert_eq!(origin_address(&HeaderMap::new(), &transport), None);
    }

    #[test]
    fn test_refresh_credential_missing_is_unauthorized() {
        let transport = TransportConfig::default();
        let err = refresh_credential(&HeaderMap::new(), &transport).unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized { .. }));

        let llc = refresh_credential(&headers(&[("x-refresh-token", "abc")]), &transport).unwrap();
        assert_eq!(llc.as_str(), "abc");
    }
}
