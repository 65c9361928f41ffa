//! Refresh protocol.
//!
//! # Security
//!
//! - The long-lived credential is compared by digest; the plaintext is never stored
//! - A fingerprint or device class mismatch is a security event and issues nothing
//! - Origin address changes are advisory and only logged
//! - Concurrent refreshes of one session serialize on the session lock, and the
//!   record update is a compare-and-swap against the bytes that were checked

use std::sync::Arc;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::session::{RefreshRequest, SessionContext};
use crate::store::session_store::VersionedRecord;
use crate::types::{LongLivedCredential, RefreshRecord, RefreshedCredential, SessionKey};

/// Exchanges long-lived credentials for short-lived ones.
#[derive(Clone)]
pub struct RefreshHandler {
    context: Arc<SessionContext>,
}

impl RefreshHandler {
    pub(crate) fn new(context: Arc<SessionContext>) -> Self {
        Self { context }
    }

    /// Mints a new short-lived credential for the session the long-lived
    /// credential belongs to.
    ///
    /// Subject, device class and fingerprint of the session never change. The
    /// previous short-lived credential stops being live once the new mirror
    /// is written.
    ///
    /// # Errors
    ///
    /// - `RefreshTokenInvalid`: no record, expired record, or the credential is
    ///   not the session's current one
    /// - `DeviceMismatch`: claimed fingerprint or device class differs from the record
    /// - `Storage` / `StoreTimeout`: transient, safe to retry
    pub async fn refresh(&self, request: RefreshRequest) -> AuthResult<RefreshedCredential> {
        let ctx = &self.context;
        ctx.check_device_class(&request.device_class)?;

        let key = SessionKey::new(request.subject_id.clone(), request.device_class.clone());

        // 1-2. Cheap rejection before taking the lock
        let current = ctx.store.refresh_record(&key).await?;
        self.check(&key, &request, current.as_ref())?;

        // 3-4. Mint and commit
        ctx.with_session_lock(&key, || self.commit(&key, &request))
            .await
    }

    /// Applies the record checks in order: existence, credential, device binding.
    fn check(
        &self,
        key: &SessionKey,
        request: &RefreshRequest,
        current: Option<&VersionedRecord>,
    ) -> AuthResult<()> {
        let Some(current) = current else {
            tracing::info!(session = %key, "refresh with unknown session");
            return Err(AuthError::RefreshTokenInvalid);
        };
        let record = &current.record;

        if record.llc_digest != request.llc.digest() {
            tracing::info!(
                session = %key,
                presented = %request.llc.digest().short(),
                "refresh with superseded or foreign credential"
            );
            return Err(AuthError::RefreshTokenInvalid);
        }

        if record.device_fingerprint != request.device_fingerprint
            || record.device_class != request.device_class
        {
            tracing::warn!(
                subject_id = %key.subject_id,
                device_class = %key.device_class,
                llc = %record.llc_digest.short(),
                origin_address = request.origin_address.as_deref().unwrap_or("-"),
                security_event = true,
                "refresh credential presented from another device"
            );
            return Err(AuthError::DeviceMismatch);
        }

        Ok(())
    }

    async fn commit(
        &self,
        key: &SessionKey,
        request: &RefreshRequest,
    ) -> AuthResult<RefreshedCredential> {
        let ctx = &self.context;
        let attempts = ctx.config.refresh.max_cas_attempts.max(1);

        for attempt in 1..=attempts {
            let current = ctx.store.refresh_record(key).await?;
            self.check(key, request, current.as_ref())?;
            let Some(current) = current else {
                return Err(AuthError::RefreshTokenInvalid);
            };

            let now = ctx.now();
            let remaining = remaining_lifetime(&current.record, ctx.config.llc_ttl, now);
            if remaining.is_zero() {
                tracing::info!(session = %key, "refresh with expired session");
                return Err(AuthError::RefreshTokenInvalid);
            }

            if let Some(origin) = request.origin_address.as_deref()
                && current.record.origin_address.as_deref() != Some(origin)
            {
                tracing::info!(
                    session = %key,
                    previous = current.record.origin_address.as_deref().unwrap_or("-"),
                    current = origin,
                    "session origin address changed"
                );
            }

            let minted = ctx.mint(key, &request.device_fingerprint, now)?;
            let rotated = ctx
                .config
                .refresh
                .rotate_refresh_credential
                .then(LongLivedCredential::generate);

            let updated = RefreshRecord {
                origin_address: request
                    .origin_address
                    .clone()
                    .or_else(|| current.record.origin_address.clone()),
                llc_digest: rotated
                    .as_ref()
                    .map_or_else(|| current.record.llc_digest.clone(), LongLivedCredential::digest),
                slc_id: minted.jti.clone(),
                slc_version: current.record.slc_version.saturating_add(1),
                last_used_at: now,
                ..current.record.clone()
            };

            if !ctx
                .store
                .swap_refresh_record(&current, &updated, remaining)
                .await?
            {
                tracing::debug!(session = %key, attempt, "refresh record changed concurrently");
                continue;
            }

            ctx.store
                .put_mirror(key, &minted.slc, ctx.config.slc_ttl)
                .await?;

            tracing::info!(
                subject_id = %key.subject_id,
                device_class = %key.device_class,
                slc_version = updated.slc_version,
                rotated = rotated.is_some(),
                "session refreshed"
            );

            return Ok(RefreshedCredential {
                slc: minted.slc,
                slc_ttl: ctx.config.slc_ttl,
                slc_expires_at: minted.expires_at,
                llc: rotated,
            });
        }

        Err(AuthError::storage(format!(
            "refresh record for {key} kept changing"
        )))
    }
}

/// Time left in the session's long-lived window, measured from `issued_at`.
fn remaining_lifetime(
    record: &RefreshRecord,
    llc_ttl: std::time::Duration,
    now: OffsetDateTime,
) -> std::time::Duration {
    let expires_at = record.issued_at + llc_ttl;
    let left = expires_at - now;
    if left.is_positive() {
        std::time::Duration::try_from(left).unwrap_or_default()
    } else {
        std::time::Duration::ZERO
    }
}
