//! Short-lived credential codec.
//!
//! Short-lived credentials are compact JWTs signed with HS256 (shared secret)
//! or ES384 (P-384 ECDSA). Decoding verifies signature, issuer and claim
//! schema only; expiry is decided by the caller against its own clock so that
//! `now == exp` is treated as expired.
//!
//! ## Example
//!
//! ```ignore
//! use tandem_auth::token::{CredentialSigner, JwtCodec, SigningKey};
//!
//! let key = SigningKey::generate_ec()?;
//! let codec = JwtCodec::new(key, "https://api.example.com");
//!
//! let slc = codec.sign(&claims)?;
//! let decoded = codec.verify(slc.as_str())?;
//! ```

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use p384::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::config::SigningConfig;
use crate::types::ShortLivedCredential;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while signing or verifying credentials.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a credential.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a credential.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// Failed to generate a key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a new `KeyGenerationError`.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a key-related error.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::KeyGenerationError { .. } | Self::InvalidKey { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
                Self::invalid_key(err.to_string())
            }
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms for short-lived credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256 over a shared secret.
    HS256,
    /// ECDSA with the P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::ES384 => "ES384",
        }
    }

    /// Parses an algorithm name.
    ///
    /// # Errors
    /// Returns `InvalidKey` for unsupported names.
    pub fn parse(name: &str) -> Result<Self, JwtError> {
        match name {
            "HS256" => Ok(Self::HS256),
            "ES384" => Ok(Self::ES384),
            other => Err(JwtError::invalid_key(format!(
                "unsupported signing algorithm '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Claims
// ============================================================================

/// Claims carried by a short-lived credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// Issuer.
    pub iss: String,

    /// Subject identifier.
    pub sub: String,

    /// Device class the credential is bound to.
    pub dcl: String,

    /// Device fingerprint the credential is bound to.
    pub dfp: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Unique credential ID. Keeps two credentials minted in the same second
    /// for the same session distinct.
    pub jti: String,
}

// ============================================================================
// Signing Key
// ============================================================================

/// Key material for signing and verifying short-lived credentials.
pub struct SigningKey {
    /// Key ID placed in the JWT header.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Creates an HS256 key from a shared secret.
    ///
    /// # Errors
    /// Returns an error if the secret is shorter than 32 bytes.
    pub fn hmac(secret: &[u8], kid: impl Into<String>) -> Result<Self, JwtError> {
        if secret.len() < 32 {
            return Err(JwtError::invalid_key("HS256 secret must be at least 32 bytes"));
        }
        Ok(Self {
            kid: kid.into(),
            algorithm: SigningAlgorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        })
    }

    /// Generates a new P-384 key pair.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, JwtError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        Self::from_ec_secret(&secret_key, uuid::Uuid::new_v4().to_string())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))
    }

    /// Loads a P-384 private key from PEM (PKCS#8 or SEC1).
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid.
    pub fn from_ec_pem(private_pem: &str, kid: impl Into<String>) -> Result<Self, JwtError> {
        let secret_key = EcSecretKey::from_pkcs8_pem(private_pem)
            .or_else(|_| EcSecretKey::from_sec1_pem(private_pem))
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        Self::from_ec_secret(&secret_key, kid.into())
    }

    fn from_ec_secret(secret_key: &EcSecretKey, kid: String) -> Result<Self, JwtError> {
        let signing_key = EcSigningKey::from(secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| JwtError::invalid_key("Missing x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| JwtError::invalid_key("Missing y coordinate"))?;

        // jsonwebtoken only accepts PKCS#8 for EC private keys
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        let x_b64 = URL_SAFE_NO_PAD.encode(x.as_slice());
        let y_b64 = URL_SAFE_NO_PAD.encode(y.as_slice());
        let decoding_key = DecodingKey::from_ec_components(&x_b64, &y_b64)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid,
            algorithm: SigningAlgorithm::ES384,
            encoding_key,
            decoding_key,
        })
    }

    /// Builds the signing key described by configuration.
    ///
    /// ES384 without a configured key generates an ephemeral one; credentials
    /// then do not survive a restart.
    ///
    /// # Errors
    /// Returns an error if the algorithm is unsupported or the key is invalid.
    pub fn from_config(config: &SigningConfig) -> Result<Self, JwtError> {
        let kid = config.key_id.clone().unwrap_or_else(|| "default".to_string());
        match SigningAlgorithm::parse(&config.algorithm)? {
            SigningAlgorithm::HS256 => {
                let secret = config
                    .secret
                    .as_deref()
                    .ok_or_else(|| JwtError::invalid_key("HS256 requires signing.secret"))?;
                Self::hmac(secret.as_bytes(), kid)
            }
            SigningAlgorithm::ES384 => match &config.private_key_pem {
                Some(pem) => Self::from_ec_pem(pem, kid),
                None => {
                    tracing::warn!(
                        "no ES384 private key configured, generating an ephemeral signing key"
                    );
                    Self::generate_ec()
                }
            },
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Signer
// ============================================================================

/// Signature provider for short-lived credentials.
pub trait CredentialSigner: Send + Sync {
    /// Signs `claims` into an encoded credential.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    fn sign(&self, claims: &SessionClaims) -> Result<ShortLivedCredential, JwtError>;

    /// Verifies signature and schema of an encoded credential and returns its
    /// claims. Does not check expiry.
    ///
    /// # Errors
    /// Returns an error if the credential is malformed or the signature does
    /// not verify.
    fn verify(&self, credential: &str) -> Result<SessionClaims, JwtError>;
}

/// JWT-based [`CredentialSigner`].
///
/// Thread-safe (`Send + Sync`); share it behind an `Arc`.
pub struct JwtCodec {
    key: SigningKey,
    issuer: String,
    validation: Validation,
}

impl JwtCodec {
    /// Creates a codec signing with `key` and requiring `issuer`.
    #[must_use]
    pub fn new(key: SigningKey, issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();
        let mut validation = Validation::new(key.algorithm.to_jwt_algorithm());
        validation.set_issuer(&[&issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        Self {
            key,
            issuer,
            validation,
        }
    }

    /// Returns the configured issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the signing algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.key.algorithm
    }
}

impl CredentialSigner for JwtCodec {
    fn sign(&self, claims: &SessionClaims) -> Result<ShortLivedCredential, JwtError> {
        let mut header = Header::new(self.key.algorithm.to_jwt_algorithm());
        header.kid = Some(self.key.kid.clone());

        encode(&header, claims, &self.key.encoding_key)
            .map(ShortLivedCredential::new)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    fn verify(&self, credential: &str) -> Result<SessionClaims, JwtError> {
        let data = decode::<SessionClaims>(credential, &self.key.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}
