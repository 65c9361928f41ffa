//! Request-time validation of short-lived credentials.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::session::SessionContext;
use crate::types::{DeviceClass, DeviceFingerprint, SessionKey, SubjectId, ValidatedSession};

/// Checks short-lived credentials.
///
/// Never refreshes. Performs exactly one store read (the mirror) once the
/// credential passes its offline checks, and no writes.
#[derive(Clone)]
pub struct SessionValidator {
    context: Arc<SessionContext>,
}

impl SessionValidator {
    pub(crate) fn new(context: Arc<SessionContext>) -> Self {
        Self { context }
    }

    /// Validates `slc` for a request claiming `device_class`.
    ///
    /// # Errors
    ///
    /// Checked in order:
    /// - `CredentialMalformed`: signature, issuer or claim schema invalid
    /// - `CredentialExpired`: `now >= exp`
    /// - `PlatformMismatch`: claimed device class differs from the credential's
    /// - `DeviceMismatch`: a claimed fingerprint differs from the credential's
    /// - `CredentialRevoked`: the store mirror is absent or holds another credential
    ///
    /// Store failures surface as transient errors, never as `CredentialRevoked`.
    pub async fn validate(
        &self,
        slc: &str,
        device_class: &DeviceClass,
        device_fingerprint: Option<&DeviceFingerprint>,
    ) -> AuthResult<ValidatedSession> {
        let ctx = &self.context;

        // 1. Signature and schema
        let claims = ctx
            .signer
            .verify(slc)
            .map_err(|e| AuthError::malformed(e.to_string()))?;
        let subject_id = SubjectId::parse(claims.sub)
            .map_err(|_| AuthError::malformed("invalid subject claim"))?;
        let embedded_class = DeviceClass::parse(&claims.dcl)
            .map_err(|_| AuthError::malformed("invalid device class claim"))?;
        let embedded_fingerprint = DeviceFingerprint::parse(claims.dfp)
            .map_err(|_| AuthError::malformed("invalid fingerprint claim"))?;
        let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp)
            .map_err(|_| AuthError::malformed("invalid expiry claim"))?;

        // 2. Expiry
        if ctx.clock.now().unix_timestamp() >= claims.exp {
            tracing::debug!(
                subject_id = %subject_id,
                device_class = %embedded_class,
                "credential expired"
            );
            return Err(AuthError::CredentialExpired);
        }

        // 3. Device binding
        if embedded_class != *device_class {
            tracing::info!(
                subject_id = %subject_id,
                expected = %embedded_class,
                actual = %device_class,
                "platform mismatch"
            );
            return Err(AuthError::platform_mismatch(
                embedded_class.as_str(),
                device_class.as_str(),
            ));
        }
        if let Some(claimed) = device_fingerprint
            && *claimed != embedded_fingerprint
        {
            tracing::warn!(
                subject_id = %subject_id,
                device_class = %embedded_class,
                security_event = true,
                "short-lived credential presented from another device"
            );
            return Err(AuthError::DeviceMismatch);
        }

        // 4. Liveness
        let key = SessionKey::new(subject_id, embedded_class);
        match ctx.store.mirror(&key).await? {
            Some(mirrored) if mirrored == slc.as_bytes() => {}
            _ => {
                tracing::debug!(session = %key, "credential not live");
                return Err(AuthError::CredentialRevoked);
            }
        }

        // 5. Identity
        Ok(ValidatedSession {
            subject_id: key.subject_id,
            device_class: key.device_class,
            device_fingerprint: embedded_fingerprint,
            expires_at,
        })
    }
}
