//! Credential store interface.
//!
//! The store is the only shared mutable state of the subsystem. It holds:
//!
//! - the mirror of the live short-lived credential per session key
//! - the refresh record behind each long-lived credential
//! - the per-subject session index
//! - short per-session write locks
//!
//! Callers never build key strings themselves; every key is a [`StoreKey`].
//!
//! # Implementations
//!
//! - [`MemoryCredentialStore`] - single-process store backed by `DashMap`
//! - `tandem-auth-redis` - shared Redis store

pub mod memory;
pub mod session_store;

use std::time::Duration;

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{SessionKey, SubjectId};

pub use memory::MemoryCredentialStore;
pub use session_store::SessionStore;

/// Typed key into the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Mirror of the live short-lived credential.
    Mirror(SessionKey),
    /// Refresh record of the session.
    Refresh(SessionKey),
    /// Device classes with a session, per subject.
    Index(SubjectId),
    /// Per-session write lock.
    Lock(SessionKey),
}

impl StoreKey {
    /// Returns the namespace segment of this key.
    #[must_use]
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Mirror(_) => "slc",
            Self::Refresh(_) => "llc",
            Self::Index(_) => "idx",
            Self::Lock(_) => "lock",
        }
    }

    /// Renders the key as a flat string.
    ///
    /// The subject is length-prefixed so that no subject value can collide
    /// with another key's device class segment.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Mirror(key) | Self::Refresh(key) | Self::Lock(key) => format!(
                "{}:{}:{}:{}",
                self.namespace(),
                key.subject_id.as_str().len(),
                key.subject_id,
                key.device_class
            ),
            Self::Index(subject_id) => format!(
                "{}:{}:{}",
                self.namespace(),
                subject_id.as_str().len(),
                subject_id
            ),
        }
    }
}

/// A TTL-capable key/value store, linearizable per key.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the value under `key`, or `None` if absent or expired.
    async fn get(&self, key: &StoreKey) -> AuthResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &StoreKey, value: &[u8], ttl: Duration) -> AuthResult<()>;

    /// Removes `key`. Returns `true` if a live value was removed.
    async fn delete(&self, key: &StoreKey) -> AuthResult<bool>;

    /// Atomically replaces the value under `key` if it currently equals
    /// `expected` (`None` meaning absent).
    ///
    /// A `new` of `None` deletes the key. Returns `false` without writing
    /// when the current value differs.
    async fn compare_and_swap(
        &self,
        key: &StoreKey,
        expected: Option<&[u8]>,
        new: Option<&[u8]>,
        ttl: Duration,
    ) -> AuthResult<bool>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> AuthResult<()> {
        Ok(())
    }
}
