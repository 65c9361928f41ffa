//! Typed session operations over a [`CredentialStore`].
//!
//! Every call is bounded by the configured operation timeout. A timeout
//! surfaces as [`AuthError::StoreTimeout`], which is transient and never
//! means the credential was revoked.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};

use crate::AuthResult;
use crate::error::AuthError;
use crate::store::{CredentialStore, StoreKey};
use crate::types::{RefreshRecord, SessionIndex, SessionKey, ShortLivedCredential, SubjectId};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A refresh record together with the exact bytes it was read from.
///
/// The raw bytes are the expected value for a later compare-and-swap.
#[derive(Debug, Clone)]
pub struct VersionedRecord {
    /// The decoded record.
    pub record: RefreshRecord,
    /// The stored bytes.
    pub raw: Vec<u8>,
}

/// Typed facade over the credential store.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<dyn CredentialStore>,
    operation_timeout: Duration,
}

impl SessionStore {
    /// Creates a facade over `inner` with the given per-operation timeout.
    #[must_use]
    pub fn new(inner: Arc<dyn CredentialStore>, operation_timeout: Duration) -> Self {
        Self {
            inner,
            operation_timeout,
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn CredentialStore> {
        &self.inner
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = AuthResult<T>>,
    ) -> AuthResult<T> {
        match timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.operation_timeout.as_millis() as u64,
                    "credential store operation timed out"
                );
                Err(AuthError::StoreTimeout { operation })
            }
        }
    }

    // ------------------------------------------------------------------------
    // Short-lived credential mirror
    // ------------------------------------------------------------------------

    /// Reads the mirrored short-lived credential of a session.
    pub async fn mirror(&self, key: &SessionKey) -> AuthResult<Option<Vec<u8>>> {
        let store_key = StoreKey::Mirror(key.clone());
        self.bounded("get", self.inner.get(&store_key)).await
    }

    /// Replaces the mirrored short-lived credential of a session.
    pub async fn put_mirror(
        &self,
        key: &SessionKey,
        slc: &ShortLivedCredential,
        ttl: Duration,
    ) -> AuthResult<()> {
        let store_key = StoreKey::Mirror(key.clone());
        self.bounded("set", self.inner.set(&store_key, slc.as_bytes(), ttl))
            .await
    }

    /// Removes the mirrored short-lived credential of a session.
    pub async fn delete_mirror(&self, key: &SessionKey) -> AuthResult<bool> {
        let store_key = StoreKey::Mirror(key.clone());
        self.bounded("delete", self.inner.delete(&store_key)).await
    }

    // ------------------------------------------------------------------------
    // Refresh records
    // ------------------------------------------------------------------------

    /// Reads the refresh record of a session.
    pub async fn refresh_record(&self, key: &SessionKey) -> AuthResult<Option<VersionedRecord>> {
        let store_key = StoreKey::Refresh(key.clone());
        let Some(raw) = self.bounded("get", self.inner.get(&store_key)).await? else {
            return Ok(None);
        };
        let record: RefreshRecord = serde_json::from_slice(&raw).map_err(|e| {
            tracing::error!(session = %key, error = %e, "corrupt refresh record");
            AuthError::internal(format!("corrupt refresh record: {e}"))
        })?;
        Ok(Some(VersionedRecord { record, raw }))
    }

    /// Writes a refresh record unconditionally.
    pub async fn put_refresh_record(
        &self,
        record: &RefreshRecord,
        ttl: Duration,
    ) -> AuthResult<()> {
        let store_key = StoreKey::Refresh(record.session_key());
        let bytes = encode(record)?;
        self.bounded("set", self.inner.set(&store_key, &bytes, ttl))
            .await
    }

    /// Replaces a refresh record only if it still holds `expected`.
    pub async fn swap_refresh_record(
        &self,
        expected: &VersionedRecord,
        new: &RefreshRecord,
        ttl: Duration,
    ) -> AuthResult<bool> {
        let store_key = StoreKey::Refresh(new.session_key());
        let bytes = encode(new)?;
        self.bounded(
            "compare_and_swap",
            self.inner
                .compare_and_swap(&store_key, Some(&expected.raw), Some(&bytes), ttl),
        )
        .await
    }

    /// Removes the refresh record of a session.
    pub async fn delete_refresh_record(&self, key: &SessionKey) -> AuthResult<bool> {
        let store_key = StoreKey::Refresh(key.clone());
        self.bounded("delete", self.inner.delete(&store_key)).await
    }

    // ------------------------------------------------------------------------
    // Per-subject index
    // ------------------------------------------------------------------------

    /// Reads the session index of a subject. Absent means empty.
    pub async fn index(&self, subject_id: &SubjectId) -> AuthResult<SessionIndex> {
        Ok(self.index_versioned(subject_id).await?.0)
    }

    async fn index_versioned(
        &self,
        subject_id: &SubjectId,
    ) -> AuthResult<(SessionIndex, Option<Vec<u8>>)> {
        let store_key = StoreKey::Index(subject_id.clone());
        match self.bounded("get", self.inner.get(&store_key)).await? {
            Some(raw) => {
                let index = serde_json::from_slice(&raw).unwrap_or_else(|e| {
                    tracing::warn!(
                        subject_id = %subject_id,
                        error = %e,
                        "discarding corrupt session index"
                    );
                    SessionIndex::default()
                });
                Ok((index, Some(raw)))
            }
            None => Ok((SessionIndex::default(), None)),
        }
    }

    /// Applies `change` to a subject's index with compare-and-swap, retrying
    /// on contention. An index left empty is deleted.
    pub async fn update_index(
        &self,
        subject_id: &SubjectId,
        ttl: Duration,
        max_attempts: u32,
        change: impl Fn(&mut SessionIndex),
    ) -> AuthResult<()> {
        let store_key = StoreKey::Index(subject_id.clone());
        for attempt in 1..=max_attempts.max(1) {
            let (mut index, raw) = self.index_versioned(subject_id).await?;
            let before = index.clone();
            change(&mut index);
            if raw.is_some() && index == before {
                return Ok(());
            }

            let new = if index.device_classes.is_empty() {
                None
            } else {
                Some(encode(&index)?)
            };
            let swapped = self
                .bounded(
                    "compare_and_swap",
                    self.inner
                        .compare_and_swap(&store_key, raw.as_deref(), new.as_deref(), ttl),
                )
                .await?;
            if swapped {
                return Ok(());
            }
            tracing::debug!(
                subject_id = %subject_id,
                attempt,
                "session index contention, retrying"
            );
        }
        Err(AuthError::storage(format!(
            "session index for subject {subject_id} kept changing"
        )))
    }

    // ------------------------------------------------------------------------
    // Per-session lock
    // ------------------------------------------------------------------------

    /// Runs `f` while holding the write lock of `key`.
    ///
    /// The lock expires after `lock_ttl` even if never released, so a
    /// cancelled holder blocks other writers for at most that long.
    pub async fn with_lock<T, F, Fut>(
        &self,
        key: &SessionKey,
        lock_ttl: Duration,
        lock_wait: Duration,
        f: F,
    ) -> AuthResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AuthResult<T>>,
    {
        let owner = self.acquire_lock(key, lock_ttl, lock_wait).await?;
        let result = f().await;
        if let Err(e) = self.release_lock(key, &owner).await {
            tracing::warn!(session = %key, error = %e, "failed to release session lock");
        }
        result
    }

    async fn acquire_lock(
        &self,
        key: &SessionKey,
        lock_ttl: Duration,
        lock_wait: Duration,
    ) -> AuthResult<String> {
        let store_key = StoreKey::Lock(key.clone());
        let owner = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + lock_wait;
        loop {
            let acquired = self
                .bounded(
                    "compare_and_swap",
                    self.inner
                        .compare_and_swap(&store_key, None, Some(owner.as_bytes()), lock_ttl),
                )
                .await?;
            if acquired {
                return Ok(owner);
            }
            if Instant::now() + LOCK_POLL_INTERVAL > deadline {
                tracing::warn!(session = %key, "timed out waiting for session lock");
                return Err(AuthError::StoreTimeout { operation: "lock" });
            }
            sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    async fn release_lock(&self, key: &SessionKey, owner: &str) -> AuthResult<()> {
        let store_key = StoreKey::Lock(key.clone());
        self.bounded(
            "compare_and_swap",
            self.inner
                .compare_and_swap(&store_key, Some(owner.as_bytes()), None, Duration::ZERO),
        )
        .await
        .map(|_| ())
    }

    /// Checks that the store is reachable.
    pub async fn ping(&self) -> AuthResult<()> {
        self.bounded("ping", self.inner.ping()).await
    }
}

fn encode<T: serde::Serialize>(value: &T) -> AuthResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| AuthError::internal(format!("serialization failed: {e}")))
}
