//! Durable Credential Storage
//!
//! Two key-value entries survive restarts: the opaque bearer token and the
//! serialized viewer profile. They are written together and cleared
//! together.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::api::User;

/// Key holding the bearer token
pub const TOKEN_KEY: &str = "access_token";
/// Key holding the JSON-serialized profile
pub const USER_KEY: &str = "user";

/// Credential and profile as persisted
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSession {
    pub access_token: String,
    pub user: User,
}

impl PersistedSession {
    fn to_entries(&self) -> Result<HashMap<String, String>, StoreError> {
        let mut entries = HashMap::new();
        entries.insert(TOKEN_KEY.to_string(), self.access_token.clone());
        entries.insert(USER_KEY.to_string(), serde_json::to_string(&self.user)?);
        Ok(entries)
    }

    /// Both entries must be present for a session to exist
    fn from_entries(entries: &HashMap<String, String>) -> Result<Option<Self>, StoreError> {
        let (Some(token), Some(user)) = (entries.get(TOKEN_KEY), entries.get(USER_KEY)) else {
            return Ok(None);
        };
        Ok(Some(Self {
            access_token: token.clone(),
            user: serde_json::from_str(user)?,
        }))
    }
}

/// Client-durable storage for the session
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistedSession>, StoreError>;
    fn save(&self, session: &PersistedSession) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// JSON file store under the user's data directory
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_local_dir>/quickpoll/session.json`
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .map(|p| p.join("quickpoll").join("session.json"))
            .unwrap_or_else(|| PathBuf::from("./quickpoll_session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<HashMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl CredentialStore for FileStore {
    fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        PersistedSession::from_entries(&self.read_entries()?)
    }

    fn save(&self, session: &PersistedSession) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write-then-rename so both entries land in a single step
        let content = serde_json::to_string_pretty(&session.to_entries()?)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store, used when nothing should touch the disk
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a single raw entry
    pub fn insert_raw(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().map(|e| e.is_empty()).unwrap_or(true)
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        PersistedSession::from_entries(&entries)
    }

    fn save(&self, session: &PersistedSession) -> Result<(), StoreError> {
        let fresh = session.to_entries()?;
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        *entries = fresh;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .clear();
        Ok(())
    }
}

/// Errors from the credential store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}
