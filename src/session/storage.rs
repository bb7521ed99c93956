//! Persisted client-side session record.
//!
//! The whole `Session` is serialized as JSON under a single fixed key, either
//! in the OS keychain (via the `keyring` crate) or in a file under the user's
//! data directory. Clearing is idempotent for both backends.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use keyring::Entry;
use thiserror::Error;

use super::Session;
use crate::config::StoreKind;

/// Fixed key the session record is stored under.
pub const SESSION_STORAGE_KEY: &str = "marketplace_session";

/// Keychain service name used by `KeychainStorage::default()`.
pub const KEYCHAIN_SERVICE: &str = "com.marketplace.client";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Keychain operation failed: {0}")]
    Keychain(String),
    #[error("Session file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt session record: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("No data directory available for session file")]
    NoDataDir,
}

impl From<keyring::Error> for StorageError {
    fn from(err: keyring::Error) -> Self {
        StorageError::Keychain(err.to_string())
    }
}

/// Backend holding the persisted session between process runs.
pub trait SessionStorage: Send + Sync {
    /// Read the stored session. `Ok(None)` when nothing has been saved.
    fn load(&self) -> Result<Option<Session>, StorageError>;

    /// Replace the stored session wholesale.
    fn save(&self, session: &Session) -> Result<(), StorageError>;

    /// Remove the stored session. Succeeds when nothing is stored.
    fn clear(&self) -> Result<(), StorageError>;
}

/// Session record kept in the OS keychain.
pub struct KeychainStorage {
    service: String,
}

impl KeychainStorage {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry, StorageError> {
        Ok(Entry::new(&self.service, SESSION_STORAGE_KEY)?)
    }
}

impl Default for KeychainStorage {
    fn default() -> Self {
        Self::new(KEYCHAIN_SERVICE)
    }
}

impl SessionStorage for KeychainStorage {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        match self.entry()?.get_password() {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::from(e)),
        }
    }

    fn save(&self, session: &Session) -> Result<(), StorageError> {
        let json = serde_json::to_string(session)?;
        self.entry()?.set_password(&json)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::from(e)),
        }
    }
}

/// Session record kept as a JSON file.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_local_dir>/marketplace-client/marketplace_session.json`
    pub fn in_data_dir() -> Result<Self, StorageError> {
        let base = dirs::data_local_dir().ok_or(StorageError::NoDataDir)?;
        Ok(Self::new(
            base.join("marketplace-client")
                .join(format!("{SESSION_STORAGE_KEY}.json")),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, session: &Session) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(session)?;
        fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process storage. Nothing survives the process; used by tests and `--store memory`.
#[derive(Default)]
pub struct MemoryStorage {
    record: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        match self.slot().as_deref() {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, session: &Session) -> Result<(), StorageError> {
        *self.slot() = Some(serde_json::to_string(session)?);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.slot() = None;
        Ok(())
    }
}

/// Open the storage backend selected by configuration.
pub fn open(kind: &StoreKind) -> Result<Arc<dyn SessionStorage>, StorageError> {
    Ok(match kind {
        StoreKind::Keychain => Arc::new(KeychainStorage::default()),
        StoreKind::File(Some(path)) => Arc::new(FileStorage::new(path.clone())),
        StoreKind::File(None) => Arc::new(FileStorage::in_data_dir()?),
        StoreKind::Memory => Arc::new(MemoryStorage::new()),
    })
}
