//! Session authentication configuration.
//!
//! All sections deserialize with `#[serde(default)]`, so a configuration file
//! only has to name the values it overrides. Durations use humantime notation
//! (`"15m"`, `"7d"`, `"2s"`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root session authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "https://api.example.com"
/// slc_ttl = "15m"
/// llc_ttl = "7d"
/// device_classes = ["web", "mobile-ios", "mobile-android"]
///
/// [auth.signing]
/// algorithm = "HS256"
/// secret = "change-me-to-at-least-32-bytes-of-entropy"
///
/// [auth.refresh]
/// rotate_refresh_credential = false
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer embedded in (and required of) every short-lived credential.
    pub issuer: String,

    /// Lifetime of a short-lived credential and of its store mirror.
    #[serde(with = "humantime_serde")]
    pub slc_ttl: Duration,

    /// Lifetime of a long-lived credential record.
    #[serde(with = "humantime_serde")]
    pub llc_ttl: Duration,

    /// Accepted device classes. Empty accepts any well-formed class.
    pub device_classes: Vec<String>,

    /// Subjects allowed to force-revoke other subjects' sessions.
    pub admin_subjects: Vec<String>,

    /// Credential signing configuration.
    pub signing: SigningConfig,

    /// Refresh protocol behaviour.
    pub refresh: RefreshConfig,

    /// Credential store access.
    pub store: StoreConfig,

    /// Request header names.
    pub transport: TransportConfig,

    /// Cookie fallback for browser clients.
    pub cookie: CookieConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            slc_ttl: Duration::from_secs(15 * 60),
            llc_ttl: Duration::from_secs(7 * 24 * 3600),
            device_classes: Vec::new(),
            admin_subjects: Vec::new(),
            signing: SigningConfig::default(),
            refresh: RefreshConfig::default(),
            store: StoreConfig::default(),
            transport: TransportConfig::default(),
            cookie: CookieConfig::default(),
        }
    }
}

/// Credential signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm: `HS256` or `ES384`.
    pub algorithm: String,

    /// Shared secret for `HS256`. At least 32 bytes.
    pub secret: Option<String>,

    /// PKCS#8 or SEC1 PEM private key for `ES384`.
    /// When absent an ephemeral key is generated at startup.
    pub private_key_pem: Option<String>,

    /// Key ID placed in the credential header.
    pub key_id: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "HS256".to_string(),
            secret: None,
            private_key_pem: None,
            key_id: None,
        }
    }
}

/// Refresh protocol configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Replace the long-lived credential on every refresh.
    /// The previous value stops working as soon as the new one is stored.
    pub rotate_refresh_credential: bool,

    /// Lifetime of the per-session write lock.
    #[serde(with = "humantime_serde")]
    pub lock_ttl: Duration,

    /// How long a writer waits for the per-session lock before giving up.
    #[serde(with = "humantime_serde")]
    pub lock_wait: Duration,

    /// Compare-and-swap attempts on the refresh record before giving up.
    pub max_cas_attempts: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            rotate_refresh_credential: false,
            lock_ttl: Duration::from_secs(5),
            lock_wait: Duration::from_secs(2),
            max_cas_attempts: 3,
        }
    }
}

/// Credential store access configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound on a single store operation.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(2),
        }
    }
}

/// Header names used to carry credentials and device metadata.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Header carrying the long-lived credential.
    pub refresh_header: String,

    /// Header carrying the claimed device class.
    pub device_class_header: String,

    /// Header carrying the claimed device fingerprint.
    pub fingerprint_header: String,

    /// Header consulted for the client's origin address.
    pub origin_header: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            refresh_header: "x-refresh-token".to_string(),
            device_class_header: "x-device-class".to_string(),
            fingerprint_header: "x-device-fingerprint".to_string(),
            origin_header: "x-forwarded-for".to_string(),
        }
    }
}

/// Cookie fallback for the short-lived credential.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Accept the short-lived credential from a cookie when no
    /// `Authorization` header is present.
    pub enabled: bool,

    /// Cookie name.
    pub name: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "tandem_slc".to_string(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The issuer is empty
    /// - A lifetime is zero, or `slc_ttl` is not shorter than `llc_ttl`
    /// - The signing algorithm is not supported
    /// - A header name is empty
    ///
    /// Returns `ConfigError::Missing` if `HS256` is selected without a secret.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        if self.slc_ttl.as_secs() == 0 || self.llc_ttl.as_secs() == 0 {
            return Err(ConfigError::InvalidValue(
                "slc_ttl and llc_ttl must be at least one second".to_string(),
            ));
        }

        if self.slc_ttl >= self.llc_ttl {
            return Err(ConfigError::InvalidValue(format!(
                "slc_ttl ({:?}) must be shorter than llc_ttl ({:?})",
                self.slc_ttl, self.llc_ttl
            )));
        }

        match self.signing.algorithm.as_str() {
            "HS256" => match &self.signing.secret {
                None => return Err(ConfigError::Missing("signing.secret".to_string())),
                Some(secret) if secret.len() < 32 => {
                    return Err(ConfigError::InvalidValue(
                        "signing.secret must be at least 32 bytes".to_string(),
                    ));
                }
                Some(_) => {}
            },
            "ES384" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{}'. Must be HS256 or ES384",
                    other
                )));
            }
        }

        if self.refresh.max_cas_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "refresh.max_cas_attempts must be > 0".to_string(),
            ));
        }

        if self.store.operation_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "store.operation_timeout must be > 0".to_string(),
            ));
        }

        for (name, value) in [
            ("transport.refresh_header", &self.transport.refresh_header),
            (
                "transport.device_class_header",
                &self.transport.device_class_header,
            ),
            (
                "transport.fingerprint_header",
                &self.transport.fingerprint_header,
            ),
        ] {
            if value.is_empty() {
                return Err(ConfigError::InvalidValue(format!("{name} cannot be empty")));
            }
        }

        if self.cookie.enabled && self.cookie.name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "cookie.name cannot be empty when cookie auth is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns `true` if `device_class` is accepted by the allow list.
    #[must_use]
    pub fn allows_device_class(&self, device_class: &str) -> bool {
        self.device_classes.is_empty() || self.device_classes.iter().any(|c| c == device_class)
    }

    /// Returns `true` if `subject_id` may force-revoke other subjects.
    #[must_use]
    pub fn is_admin(&self, subject_id: &str) -> bool {
        self.admin_subjects.iter().any(|s| s == subject_id)
    }
}
