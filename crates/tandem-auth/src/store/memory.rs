//! In-process credential store backed by `DashMap`.
//!
//! Suitable for single-instance deployments and tests. Entries expire lazily
//! on access; [`MemoryCredentialStore::purge_expired`] sweeps the rest.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::AuthResult;
use crate::store::{CredentialStore, StoreKey};

/// A stored value with its deadline.
#[derive(Clone, Debug)]
struct StoredEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl StoredEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Single-process credential store.
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    entries: Arc<DashMap<StoreKey, StoredEntry>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "purged expired credential store entries");
        }
        removed
    }

    /// Number of entries currently held, including not yet purged ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &StoreKey) -> AuthResult<Option<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.data.clone()));
            }
            drop(entry);
            self.entries.remove_if(key, |_, e| e.is_expired());
        }
        Ok(None)
    }

    async fn set(&self, key: &StoreKey, value: &[u8], ttl: Duration) -> AuthResult<()> {
        self.entries
            .insert(key.clone(), StoredEntry::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &StoreKey) -> AuthResult<bool> {
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired()))
    }

    async fn compare_and_swap(
        &self,
        key: &StoreKey,
        expected: Option<&[u8]>,
        new: Option<&[u8]>,
        ttl: Duration,
    ) -> AuthResult<bool> {
        // The entry guard holds the shard lock for the whole read-compare-write.
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let current =
                    (!occupied.get().is_expired()).then(|| occupied.get().data.as_slice());
                if current != expected {
                    return Ok(false);
                }
                match new {
                    Some(value) => {
                        occupied.insert(StoredEntry::new(value.to_vec(), ttl));
                    }
                    None => {
                        occupied.remove();
                    }
                }
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                if expected.is_some() {
                    return Ok(false);
                }
                if let Some(value) = new {
                    vacant.insert(StoredEntry::new(value.to_vec(), ttl));
                }
                Ok(true)
            }
        }
    }
}
