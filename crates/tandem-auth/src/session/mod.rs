//! Session lifecycle: issue, validate, refresh, revoke.
//!
//! [`SessionService`] is the entry point. It composes four handlers that share
//! one [`SessionContext`]:
//!
//! - [`SessionIssuer`] - login, one active session per subject and device class
//! - [`SessionValidator`] - request-time gate, one store read, no writes
//! - [`RefreshHandler`] - exchanges a long-lived credential for a new
//!   short-lived one
//! - [`RevocationHandler`] - self logout and forced revocation
//!
//! # Usage
//!
//! ```ignore
//! use tandem_auth::session::{LoginRequest, SessionService};
//!
//! let service = SessionService::from_config(config, store)?;
//!
//! let issued = service.login(LoginRequest { .. }).await?;
//! let session = service
//!     .validate_request(issued.slc.as_str(), &device_class, None)
//!     .await?;
//! ```

pub mod issuer;
pub mod refresh;
pub mod revocation;
pub mod validator;

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::store::{CredentialStore, SessionStore};
use crate::token::{CredentialSigner, JwtCodec, SessionClaims, SigningKey};
use crate::types::{
    DeviceClass, DeviceFingerprint, IssuedSession, LongLivedCredential, RefreshedCredential,
    SessionKey, SessionSummary, ShortLivedCredential, SubjectId, ValidatedSession,
};

pub use issuer::SessionIssuer;
pub use refresh::RefreshHandler;
pub use revocation::RevocationHandler;
pub use validator::SessionValidator;

/// Input to [`SessionService::login`]. The password check has already passed.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Verified subject.
    pub subject_id: SubjectId,
    /// Device class the session is created for.
    pub device_class: DeviceClass,
    /// Fingerprint the session is bound to.
    pub device_fingerprint: DeviceFingerprint,
    /// Client address, advisory.
    pub origin_address: Option<String>,
}

/// Input to [`SessionService::refresh`].
#[derive(Debug, Clone)]
pub struct RefreshRequest {
    /// Subject claimed by the client.
    pub subject_id: SubjectId,
    /// Device class claimed by the client.
    pub device_class: DeviceClass,
    /// Fingerprint claimed by the client.
    pub device_fingerprint: DeviceFingerprint,
    /// The long-lived credential being exchanged.
    pub llc: LongLivedCredential,
    /// Client address, advisory.
    pub origin_address: Option<String>,
}

/// State shared by the session handlers.
pub struct SessionContext {
    pub(crate) config: AuthConfig,
    pub(crate) store: SessionStore,
    pub(crate) signer: Arc<dyn CredentialSigner>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl SessionContext {
    /// Current time truncated to whole seconds, matching credential claims.
    pub(crate) fn now(&self) -> OffsetDateTime {
        let now = self.clock.now();
        OffsetDateTime::from_unix_timestamp(now.unix_timestamp()).unwrap_or(now)
    }

    /// Rejects device classes outside the configured allow list.
    pub(crate) fn check_device_class(&self, device_class: &DeviceClass) -> AuthResult<()> {
        if self.config.allows_device_class(device_class.as_str()) {
            Ok(())
        } else {
            Err(AuthError::invalid_request(format!(
                "device class '{device_class}' is not accepted"
            )))
        }
    }

    /// Signs a new short-lived credential for `key` issued at `now`.
    pub(crate) fn mint(
        &self,
        key: &SessionKey,
        fingerprint: &DeviceFingerprint,
        now: OffsetDateTime,
    ) -> AuthResult<MintedCredential> {
        let iat = now.unix_timestamp();
        let exp = iat.saturating_add(self.config.slc_ttl.as_secs() as i64);
        let claims = SessionClaims {
            iss: self.config.issuer.clone(),
            sub: key.subject_id.to_string(),
            dcl: key.device_class.to_string(),
            dfp: fingerprint.to_string(),
            iat,
            exp,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let slc = self
            .signer
            .sign(&claims)
            .map_err(|e| AuthError::internal(format!("Failed to sign credential: {e}")))?;
        let expires_at = OffsetDateTime::from_unix_timestamp(exp)
            .map_err(|e| AuthError::internal(format!("credential expiry out of range: {e}")))?;
        Ok(MintedCredential {
            slc,
            jti: claims.jti,
            expires_at,
        })
    }

    pub(crate) async fn with_session_lock<T, F, Fut>(&self, key: &SessionKey, f: F) -> AuthResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = AuthResult<T>>,
    {
        self.store
            .with_lock(
                key,
                self.config.refresh.lock_ttl,
                self.config.refresh.lock_wait,
                f,
            )
            .await
    }

    pub(crate) async fn index_add(&self, key: &SessionKey) -> AuthResult<()> {
        let class = key.device_class.clone();
        self.store
            .update_index(
                &key.subject_id,
                self.config.llc_ttl,
                self.config.refresh.max_cas_attempts,
                |index| {
                    index.device_classes.insert(class.clone());
                },
            )
            .await
    }

    pub(crate) async fn index_remove(
        &self,
        subject_id: &SubjectId,
        classes: &[DeviceClass],
    ) -> AuthResult<()> {
        self.store
            .update_index(
                subject_id,
                self.config.llc_ttl,
                self.config.refresh.max_cas_attempts,
                |index| {
                    for class in classes {
                        index.device_classes.remove(class);
                    }
                },
            )
            .await
    }
}

/// A freshly signed short-lived credential.
pub(crate) struct MintedCredential {
    pub(crate) slc: ShortLivedCredential,
    pub(crate) jti: String,
    pub(crate) expires_at: OffsetDateTime,
}

/// Facade over the session handlers.
///
/// Thread-safe; clone it or share it behind an `Arc`.
#[derive(Clone)]
pub struct SessionService {
    context: Arc<SessionContext>,
    issuer: SessionIssuer,
    validator: SessionValidator,
    refresher: RefreshHandler,
    revoker: RevocationHandler,
}

impl SessionService {
    /// Creates a service from explicit collaborators using the system clock.
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        signer: Arc<dyn CredentialSigner>,
    ) -> Self {
        Self::from_parts(config, store, signer, Arc::new(SystemClock))
    }

    /// Creates a service from explicit collaborators.
    #[must_use]
    pub fn from_parts(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        signer: Arc<dyn CredentialSigner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = SessionStore::new(store, config.store.operation_timeout);
        let context = Arc::new(SessionContext {
            config,
            store,
            signer,
            clock,
        });
        Self {
            issuer: SessionIssuer::new(Arc::clone(&context)),
            validator: SessionValidator::new(Arc::clone(&context)),
            refresher: RefreshHandler::new(Arc::clone(&context)),
            revoker: RevocationHandler::new(Arc::clone(&context)),
            context,
        }
    }

    /// Validates `config` and builds the signing key it describes.
    ///
    /// # Errors
    /// Returns `Configuration` if the configuration or key is invalid.
    pub fn from_config(config: AuthConfig, store: Arc<dyn CredentialStore>) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|e| AuthError::configuration(e.to_string()))?;
        let key = SigningKey::from_config(&config.signing)
            .map_err(|e| AuthError::configuration(e.to_string()))?;
        tracing::info!(
            algorithm = %key.algorithm,
            kid = %key.kid,
            issuer = %config.issuer,
            "session signing key loaded"
        );
        let codec = JwtCodec::new(key, config.issuer.clone());
        Ok(Self::new(config, store, Arc::new(codec)))
    }

    /// Creates a session for a verified subject.
    ///
    /// Any previous session of the same subject and device class stops
    /// working.
    pub async fn login(&self, request: LoginRequest) -> AuthResult<IssuedSession> {
        self.issuer.issue(request).await
    }

    /// Validates a short-lived credential presented with a request.
    pub async fn validate_request(
        &self,
        slc: &str,
        device_class: &DeviceClass,
        device_fingerprint: Option<&DeviceFingerprint>,
    ) -> AuthResult<ValidatedSession> {
        self.validator
            .validate(slc, device_class, device_fingerprint)
            .await
    }

    /// Exchanges a long-lived credential for a new short-lived one.
    pub async fn refresh(&self, request: RefreshRequest) -> AuthResult<RefreshedCredential> {
        self.refresher.refresh(request).await
    }

    /// Ends the caller's own session. Idempotent.
    pub async fn logout(
        &self,
        subject_id: &SubjectId,
        device_class: &DeviceClass,
        llc: &LongLivedCredential,
    ) -> AuthResult<()> {
        self.revoker.logout(subject_id, device_class, llc).await
    }

    /// Revokes one or every session of a subject. Returns the device classes
    /// whose session was removed.
    pub async fn force_revoke(
        &self,
        subject_id: &SubjectId,
        device_class: Option<&DeviceClass>,
    ) -> AuthResult<Vec<DeviceClass>> {
        self.revoker.force_revoke(subject_id, device_class).await
    }

    /// Lists the live sessions of a subject.
    pub async fn list_sessions(&self, subject_id: &SubjectId) -> AuthResult<Vec<SessionSummary>> {
        self.revoker.list_sessions(subject_id).await
    }

    /// Checks that the credential store is reachable.
    pub async fn check_store(&self) -> AuthResult<()> {
        self.context.store.ping().await
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.context.config
    }

    /// Lifetime of newly minted short-lived credentials.
    #[must_use]
    pub fn slc_ttl(&self) -> Duration {
        self.context.config.slc_ttl
    }
}
