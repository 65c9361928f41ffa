//! Local persistence of the session credentials.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tandem_auth::{
    DeviceClass, DeviceFingerprint, LongLivedCredential, ShortLivedCredential, SubjectId,
};
use time::OffsetDateTime;

use crate::error::ClientError;

/// Everything the client needs to use and renew a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Server base URL.
    pub server: String,
    pub subject_id: SubjectId,
    pub device_class: DeviceClass,
    pub device_fingerprint: DeviceFingerprint,
    pub slc: ShortLivedCredential,
    pub llc: LongLivedCredential,
    #[serde(with = "time::serde::rfc3339")]
    pub slc_expires_at: OffsetDateTime,
}

/// Where the agent keeps credentials between runs.
pub trait TokenStore: Send + Sync {
    /// Loads the saved session, if any.
    fn load(&self) -> Result<Option<StoredSession>, ClientError>;

    /// Replaces the saved session.
    fn save(&self, session: &StoredSession) -> Result<(), ClientError>;

    /// Removes the saved session. Returns `true` if one existed.
    fn clear(&self) -> Result<bool, ClientError>;
}

/// Keeps the session in memory only.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    session: Mutex<Option<StoredSession>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<StoredSession>, ClientError> {
        Ok(self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    fn save(&self, session: &StoredSession) -> Result<(), ClientError> {
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<bool, ClientError> {
        Ok(self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some())
    }
}

/// Keeps the session in a JSON file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.tandem/credentials.<profile>.json`
    pub fn for_profile(profile: &str) -> Result<Self, ClientError> {
        let dir = dirs::home_dir()
            .ok_or_else(|| ClientError::Storage("cannot determine home directory".into()))?
            .join(".tandem");
        Ok(Self::new(dir.join(format!("credentials.{profile}.json"))))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<StoredSession>, ClientError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, session: &StoredSession) -> Result<(), ClientError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    fn clear(&self) -> Result<bool, ClientError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
