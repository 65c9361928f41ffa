//! Session issuance.

use std::sync::Arc;

use crate::AuthResult;
use crate::session::{LoginRequest, SessionContext};
use crate::types::{IssuedSession, LongLivedCredential, RefreshRecord, SessionKey};

/// Creates sessions on login.
#[derive(Clone)]
pub struct SessionIssuer {
    context: Arc<SessionContext>,
}

impl SessionIssuer {
    pub(crate) fn new(context: Arc<SessionContext>) -> Self {
        Self { context }
    }

    /// Issues a new credential pair.
    ///
    /// # Flow
    ///
    /// 1. Generate a fresh long-lived credential and mint a short-lived one
    /// 2. Under the session lock, drop any previous mirror, replace the
    ///    refresh record, write the new mirror and record the device class in
    ///    the subject's index
    ///
    /// # Errors
    ///
    /// Store failures abort the login and are returned as-is.
    pub async fn issue(&self, request: LoginRequest) -> AuthResult<IssuedSession> {
        let ctx = &self.context;
        ctx.check_device_class(&request.device_class)?;

        let key = SessionKey::new(request.subject_id.clone(), request.device_class.clone());
        let now = ctx.now();

        // 1. Credentials
        let llc = LongLivedCredential::generate();
        let minted = ctx.mint(&key, &request.device_fingerprint, now)?;

        let record = RefreshRecord {
            subject_id: request.subject_id,
            device_class: request.device_class,
            device_fingerprint: request.device_fingerprint,
            origin_address: request.origin_address,
            llc_digest: llc.digest(),
            slc_id: minted.jti.clone(),
            slc_version: 1,
            issued_at: now,
            last_used_at: now,
        };

        // 2. Replace the pair
        let superseded = ctx
            .with_session_lock(&key, || async {
                let previous = ctx.store.refresh_record(&key).await?;
                ctx.store.delete_mirror(&key).await?;
                ctx.store
                    .put_refresh_record(&record, ctx.config.llc_ttl)
                    .await?;
                ctx.store
                    .put_mirror(&key, &minted.slc, ctx.config.slc_ttl)
                    .await?;
                ctx.index_add(&key).await?;
                Ok(previous.is_some())
            })
            .await?;

        tracing::info!(
            subject_id = %key.subject_id,
            device_class = %key.device_class,
            llc = %record.llc_digest.short(),
            superseded,
            "session issued"
        );

        Ok(IssuedSession {
            slc: minted.slc,
            llc,
            slc_ttl: ctx.config.slc_ttl,
            llc_ttl: ctx.config.llc_ttl,
            slc_expires_at: minted.expires_at,
        })
    }
}
