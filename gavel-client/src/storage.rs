//! Local persistence for the credential, the CLI's analogue of browser
//! local storage.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{error::StorageError, session::Credential};

/// Where a [`crate::session::Session`] writes its credential through to.
pub trait SessionStorage: Send + Sync + fmt::Debug {
    /// Reads the stored credential; `Ok(None)` when nothing was stored yet.
    ///
    /// # Errors
    /// Returns [`StorageError`] when the store exists but cannot be read.
    fn load(&self) -> Result<Option<Credential>, StorageError>;

    /// # Errors
    /// Returns [`StorageError`] when the credential cannot be written.
    fn save(&self, credential: &Credential) -> Result<(), StorageError>;

    /// # Errors
    /// Returns [`StorageError`] when the stored credential cannot be removed.
    fn remove(&self) -> Result<(), StorageError>;
}

/// JSON file with owner-only permissions.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStorage for FileSessionStorage {
    fn load(&self) -> Result<Option<Credential>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, credential: &Credential) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(credential)?;
        fs::write(&self.path, content)?;
        restrict_permissions(&self.path)?;
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Process-local storage for tests and embedders that do their own persistence.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    slot: Mutex<Option<Credential>>,
}

impl MemorySessionStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl SessionStorage for MemorySessionStorage {
    fn load(&self) -> Result<Option<Credential>, StorageError> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }

    fn save(&self, credential: &Credential) -> Result<(), StorageError> {
        *self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        Ok(())
    }
}
