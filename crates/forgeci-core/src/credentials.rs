//! Credential storage.
//!
//! A credential store holds the three strings a build needs (owner,
//! repository, token) and hands them out as a [`BuildConfig`] at invocation
//! time. Sync and change notification across sessions are the backing
//! store's business; the engine only ever sees a config value.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::domain::BuildConfig;
use crate::error::{CoreError, Result};

/// Environment variable overriding the forgeci configuration directory.
pub const FORGECI_HOME_ENV: &str = "FORGECI_HOME";

const CREDENTIALS_FILE: &str = "credentials.json";

/// Simple synchronized string store for build credentials.
pub trait CredentialStore: Send + Sync {
    /// Current values; fields may be empty.
    fn get(&self) -> Result<BuildConfig>;

    /// Replace all three values.
    fn set(&self, config: &BuildConfig) -> Result<()>;

    /// Forget all values.
    fn clear(&self) -> Result<()>;

    /// True when owner, repository and token are all non-empty.
    fn is_ready(&self) -> bool {
        self.get().map(|c| c.is_ready()).unwrap_or(false)
    }

    /// The stored config, or `CredentialsNotReady` if any field is empty.
    fn ready_config(&self) -> Result<BuildConfig> {
        let config = self.get()?;
        if config.is_ready() {
            Ok(config)
        } else {
            Err(CoreError::CredentialsNotReady)
        }
    }
}

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<BuildConfig>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BuildConfig) -> Self {
        Self {
            inner: Mutex::new(config),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Result<BuildConfig> {
        Ok(self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn set(&self, config: &BuildConfig) -> Result<()> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = config.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = BuildConfig::default();
        Ok(())
    }
}

/// Credential store persisted as a JSON file.
///
/// A missing file reads as empty credentials. On Unix the file is written
/// with mode `0600`.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store under `dir/credentials.json`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CREDENTIALS_FILE))
    }

    /// Store at the default location: `$FORGECI_HOME/credentials.json`, or
    /// `<config dir>/forgeci/credentials.json`.
    pub fn open_default() -> Result<Self> {
        Ok(Self::in_dir(&default_config_dir()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, config: &BuildConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(config)?;
        std::fs::write(&self.path, json)?;
        restrict_permissions(&self.path)?;
        debug!(path = %self.path.display(), "credentials written");
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Result<BuildConfig> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BuildConfig::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, config: &BuildConfig) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write(config)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// forgeci configuration directory.
pub fn default_config_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(FORGECI_HOME_ENV) {
        if !home.trim().is_empty() {
            return Ok(PathBuf::from(home));
        }
    }
    let config_dir = dirs::config_dir()
        .ok_or_else(|| CoreError::Config("cannot find config directory".to_string()))?;
    Ok(config_dir.join("forgeci"))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip_and_clear() {
        let store = MemoryCredentialStore::new();
        assert!(!store.is_ready());

        store
            .set(&BuildConfig::new("octo", "apps", "ghp_x"))
            .unwrap();
        assert!(store.is_ready());
        assert_eq!(store.get().unwrap().owner, "octo");

        store.clear().unwrap();
        assert!(!store.is_ready());
        assert_eq!(store.get().unwrap(), BuildConfig::default());
    }

    #[test]
    fn test_ready_config_rejects_partial() {
        let store = MemoryCredentialStore::with_config(BuildConfig::new("octo", "", "t"));
        assert!(matches!(
            store.ready_config(),
            Err(CoreError::CredentialsNotReady)
        ));
    }
}
