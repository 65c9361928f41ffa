//! Session identity and store record types.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::types::credential::LlcDigest;

const MAX_SUBJECT_LEN: usize = 128;
const MAX_DEVICE_CLASS_LEN: usize = 32;
const MAX_FINGERPRINT_LEN: usize = 256;

// ============================================================================
// Identity newtypes
// ============================================================================

/// Identifier of an authenticated subject (user).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Parses a subject identifier from untrusted input.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the value is empty, too long, or contains
    /// control characters.
    pub fn parse(value: impl Into<String>) -> AuthResult<Self> {
        let value = value.into();
        if value.is_empty() || value.len() > MAX_SUBJECT_LEN {
            return Err(AuthError::invalid_request(format!(
                "subject_id must be 1..={MAX_SUBJECT_LEN} bytes"
            )));
        }
        if value.chars().any(char::is_control) {
            return Err(AuthError::invalid_request(
                "subject_id contains control characters",
            ));
        }
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for SubjectId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl TryFrom<String> for SubjectId {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> Self {
        id.0
    }
}

impl FromStr for SubjectId {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client platform partition (`web`, `mobile-ios`, ...).
///
/// Normalized to lowercase. At most one session is active per subject and
/// device class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceClass(String);

impl DeviceClass {
    /// Parses a device class, lowercasing it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` unless the value is 1 to 32 characters of
    /// `[a-z0-9._-]` after lowercasing.
    pub fn parse(value: impl AsRef<str>) -> AuthResult<Self> {
        let value = value.as_ref().trim().to_ascii_lowercase();
        if value.is_empty() || value.len() > MAX_DEVICE_CLASS_LEN {
            return Err(AuthError::invalid_request(format!(
                "device_class must be 1..={MAX_DEVICE_CLASS_LEN} characters"
            )));
        }
        if !value.bytes().all(|b| {
            b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'-' | b'_' | b'.')
        }) {
            return Err(AuthError::invalid_request(format!(
                "device_class '{value}' contains invalid characters"
            )));
        }
        Ok(Self(value))
    }

    /// Returns the device class as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeviceClass {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DeviceClass> for String {
    fn from(class: DeviceClass) -> Self {
        class.0
    }
}

impl FromStr for DeviceClass {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-supplied stable device identifier bound to a session at login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceFingerprint(String);

impl DeviceFingerprint {
    /// Parses a device fingerprint from untrusted input.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the value is empty, longer than 256 bytes,
    /// or contains control characters.
    pub fn parse(value: impl Into<String>) -> AuthResult<Self> {
        let value = value.into();
        if value.is_empty() || value.len() > MAX_FINGERPRINT_LEN {
            return Err(AuthError::invalid_request(format!(
                "device_fingerprint must be 1..={MAX_FINGERPRINT_LEN} bytes"
            )));
        }
        if value.chars().any(char::is_control) {
            return Err(AuthError::invalid_request(
                "device_fingerprint contains control characters",
            ));
        }
        Ok(Self(value))
    }

    /// Returns the fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeviceFingerprint {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DeviceFingerprint> for String {
    fn from(fp: DeviceFingerprint) -> Self {
        fp.0
    }
}

impl fmt::Display for DeviceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Session key
// ============================================================================

/// Partition key of a session: one active session per subject and device class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// The session's subject.
    pub subject_id: SubjectId,
    /// The session's device class.
    pub device_class: DeviceClass,
}

impl SessionKey {
    /// Creates a session key.
    #[must_use]
    pub fn new(subject_id: SubjectId, device_class: DeviceClass) -> Self {
        Self {
            subject_id,
            device_class,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject_id, self.device_class)
    }
}

// ============================================================================
// Store records
// ============================================================================

/// Authoritative record behind a long-lived credential.
///
/// One record exists per session key. The credential itself is never stored,
/// only its SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRecord {
    /// Subject the session belongs to.
    pub subject_id: SubjectId,

    /// Device class the session is bound to.
    pub device_class: DeviceClass,

    /// Fingerprint the session is bound to.
    pub device_fingerprint: DeviceFingerprint,

    /// Address the session was last used from. Advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_address: Option<String>,

    /// SHA-256 digest of the current long-lived credential.
    pub llc_digest: LlcDigest,

    /// `jti` of the short-lived credential this record currently backs.
    pub slc_id: String,

    /// Number of short-lived credentials minted for this session.
    pub slc_version: u64,

    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// When the session was last refreshed (equals `issued_at` until then).
    #[serde(with = "time::serde::rfc3339")]
    pub last_used_at: OffsetDateTime,
}

impl RefreshRecord {
    /// Returns the session key this record lives under.
    #[must_use]
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(self.subject_id.clone(), self.device_class.clone())
    }
}

/// Per-subject index of device classes with a session.
///
/// Entries may outlive the session they point to (the record can expire on
/// its own); readers confirm against the refresh record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIndex {
    /// Device classes that have (or recently had) a session.
    pub device_classes: BTreeSet<DeviceClass>,
}

/// Public view of a live session, as returned by session listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Device class of the session.
    pub device_class: DeviceClass,

    /// Advisory origin address of the last use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_address: Option<String>,

    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// When the session was last refreshed.
    #[serde(with = "time::serde::rfc3339")]
    pub last_used_at: OffsetDateTime,
}

impl From<&RefreshRecord> for SessionSummary {
    fn from(record: &RefreshRecord) -> Self {
        Self {
            device_class: record.device_class.clone(),
            origin_address: record.origin_address.clone(),
            issued_at: record.issued_at,
            last_used_at: record.last_used_at,
        }
    }
}
