//! Credential value types.
//!
//! # Security
//!
//! - Long-lived credentials are 256-bit random values, stored only as SHA-256
//!   digests
//! - `Debug` output of both credential types is redacted

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::types::session::{DeviceClass, DeviceFingerprint, SubjectId};

/// A signed short-lived credential (SLC), exactly as sent on the wire.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortLivedCredential(String);

impl ShortLivedCredential {
    /// Wraps an encoded credential.
    #[must_use]
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Returns the encoded credential.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the encoded credential as bytes, for mirror comparison.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for ShortLivedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ShortLivedCredential(<redacted>)")
    }
}

/// An opaque long-lived credential (LLC).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LongLivedCredential(String);

impl LongLivedCredential {
    /// Generates a cryptographically secure random credential.
    ///
    /// Returns a 256-bit random value encoded as base64url (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wraps a credential received from a client.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the credential value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the SHA-256 digest used to store and look up this credential.
    #[must_use]
    pub fn digest(&self) -> LlcDigest {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        LlcDigest(hex::encode(hasher.finalize()))
    }
}

impl fmt::Debug for LongLivedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LongLivedCredential(<redacted>)")
    }
}

/// Hex-encoded SHA-256 digest of a long-lived credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LlcDigest(String);

impl LlcDigest {
    /// Returns the digest as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short prefix suitable for log correlation.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

/// Credentials returned by a successful login.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// The new short-lived credential.
    pub slc: ShortLivedCredential,
    /// The new long-lived credential.
    pub llc: LongLivedCredential,
    /// Lifetime of the short-lived credential.
    pub slc_ttl: Duration,
    /// Lifetime of the long-lived credential.
    pub llc_ttl: Duration,
    /// Absolute expiry of the short-lived credential.
    pub slc_expires_at: OffsetDateTime,
}

/// Credentials returned by a successful refresh.
#[derive(Debug, Clone)]
pub struct RefreshedCredential {
    /// The new short-lived credential.
    pub slc: ShortLivedCredential,
    /// Lifetime of the short-lived credential.
    pub slc_ttl: Duration,
    /// Absolute expiry of the short-lived credential.
    pub slc_expires_at: OffsetDateTime,
    /// Replacement long-lived credential, present only when rotation is enabled.
    pub llc: Option<LongLivedCredential>,
}

/// Identity established by a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSession {
    /// The authenticated subject.
    pub subject_id: SubjectId,
    /// Device class bound to the credential.
    pub device_class: DeviceClass,
    /// Fingerprint bound to the credential.
    pub device_fingerprint: DeviceFingerprint,
    /// Expiry of the presented credential.
    pub expires_at: OffsetDateTime,
}
