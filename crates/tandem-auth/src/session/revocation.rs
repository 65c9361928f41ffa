//! Logout, forced revocation and session listing.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::AuthResult;
use crate::session::SessionContext;
use crate::types::{DeviceClass, LongLivedCredential, SessionKey, SessionSummary, SubjectId};

/// Removes sessions.
#[derive(Clone)]
pub struct RevocationHandler {
    context: Arc<SessionContext>,
}

impl RevocationHandler {
    pub(crate) fn new(context: Arc<SessionContext>) -> Self {
        Self { context }
    }

    /// Ends the session the long-lived credential belongs to.
    ///
    /// Idempotent: an unknown session, or a credential that is no longer the
    /// session's current one, is a successful no-op. A stale credential never
    /// ends a newer session.
    pub async fn logout(
        &self,
        subject_id: &SubjectId,
        device_class: &DeviceClass,
        llc: &LongLivedCredential,
    ) -> AuthResult<()> {
        let ctx = &self.context;
        let key = SessionKey::new(subject_id.clone(), device_class.clone());
        let digest = llc.digest();

        let removed = ctx
            .with_session_lock(&key, || async {
                match ctx.store.refresh_record(&key).await? {
                    Some(current) if current.record.llc_digest == digest => {
                        ctx.store.delete_mirror(&key).await?;
                        ctx.store.delete_refresh_record(&key).await?;
                        ctx.index_remove(subject_id, std::slice::from_ref(device_class))
                            .await?;
                        Ok(true)
                    }
                    Some(_) => {
                        tracing::info!(session = %key, "logout with superseded credential ignored");
                        Ok(false)
                    }
                    None => Ok(false),
                }
            })
            .await?;

        if removed {
            tracing::info!(
                subject_id = %subject_id,
                device_class = %device_class,
                "session logged out"
            );
        } else {
            tracing::debug!(session = %key, "logout of inactive session");
        }
        Ok(())
    }

    /// Revokes the session of `device_class`, or every session of the subject
    /// when no device class is given.
    ///
    /// Every-class revocation covers the subject's index plus all configured
    /// device classes, so a lost index entry cannot leave a session behind.
    pub async fn force_revoke(
        &self,
        subject_id: &SubjectId,
        device_class: Option<&DeviceClass>,
    ) -> AuthResult<Vec<DeviceClass>> {
        let ctx = &self.context;

        let targets: BTreeSet<DeviceClass> = match device_class {
            Some(class) => BTreeSet::from([class.clone()]),
            None => {
                let mut classes = ctx.store.index(subject_id).await?.device_classes;
                classes.extend(
                    ctx.config
                        .device_classes
                        .iter()
                        .filter_map(|c| DeviceClass::parse(c).ok()),
                );
                classes
            }
        };

        let mut revoked = Vec::new();
        for class in &targets {
            let key = SessionKey::new(subject_id.clone(), class.clone());
            let removed = ctx
                .with_session_lock(&key, || async {
                    let mirror = ctx.store.delete_mirror(&key).await?;
                    let record = ctx.store.delete_refresh_record(&key).await?;
                    ctx.index_remove(subject_id, std::slice::from_ref(class))
                        .await?;
                    Ok(mirror || record)
                })
                .await?;
            if removed {
                revoked.push(class.clone());
            }
        }

        tracing::info!(
            subject_id = %subject_id,
            scope = device_class.map_or("all", DeviceClass::as_str),
            revoked = revoked.len(),
            "sessions force-revoked"
        );
        Ok(revoked)
    }

    /// Lists live sessions of a subject. Index entries whose record has
    /// expired are pruned on the way.
    pub async fn list_sessions(&self, subject_id: &SubjectId) -> AuthResult<Vec<SessionSummary>> {
        let ctx = &self.context;
        let index = ctx.store.index(subject_id).await?;

        let mut live = Vec::new();
        for class in index.device_classes {
            let key = SessionKey::new(subject_id.clone(), class.clone());
            match ctx.store.refresh_record(&key).await? {
                Some(current) => live.push(SessionSummary::from(&current.record)),
                None => {
                    if let Err(e) = self.prune(&key).await {
                        tracing::debug!(
                            session = %key,
                            error = %e,
                            "failed to prune session index"
                        );
                    }
                }
            }
        }
        Ok(live)
    }

    /// Drops `key` from the index unless a login recreated its record.
    async fn prune(&self, key: &SessionKey) -> AuthResult<()> {
        let ctx = &self.context;
        ctx.with_session_lock(key, || async {
            if ctx.store.refresh_record(key).await?.is_none() {
                ctx.index_remove(&key.subject_id, std::slice::from_ref(&key.device_class))
                    .await?;
            }
            Ok(())
        })
        .await
    }
}
