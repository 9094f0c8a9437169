// ── File-backed credential store ──
//
// The paired bridge is five string values in `bridge.toml`. The application
// key can instead live in the system keyring, and `HUELINK_USERNAME`
// overrides whatever is stored.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use huelink_core::config::keys;
use huelink_core::{CoreError, CredentialStore};

use crate::{ConfigError, Settings, credentials_path};

/// Environment variable that overrides the saved application key.
pub const USERNAME_ENV: &str = "HUELINK_USERNAME";

const KEYRING_SERVICE: &str = "huelink";
const KEYRING_USER: &str = "bridge-username";

/// Pick the application key: environment first, then the keyring, then the
/// file. Empty values are skipped.
pub fn resolve_username(
    env: Option<String>,
    keyring: Option<String>,
    file: Option<String>,
) -> Option<SecretString> {
    [env, keyring, file]
        .into_iter()
        .flatten()
        .find(|v| !v.is_empty())
        .map(SecretString::from)
}

#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    keyring: bool,
    username_override: Option<String>,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    /// A store at `path` with no keyring and no environment override.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keyring: false,
            username_override: None,
            lock: Mutex::new(()),
        }
    }

    /// The store the CLI uses: platform path, keyring per settings, and
    /// `HUELINK_USERNAME` honoured.
    pub fn open(settings: &Settings) -> Self {
        Self::new(credentials_path())
            .with_keyring(settings.use_keyring)
            .with_username_override(std::env::var(USERNAME_ENV).ok())
    }

    pub fn with_keyring(mut self, enabled: bool) -> Self {
        self.keyring = enabled;
        self
    }

    pub fn with_username_override(mut self, username: Option<String>) -> Self {
        self.username_override = username;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: self.path.display().to_string(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_file(&self, values: &BTreeMap<String, String>) -> Result<(), ConfigError> {
        if values.is_empty() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => debug!(path = %self.path.display(), "removed credential file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(values)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn keyring_username(&self) -> Option<String> {
        if !self.keyring {
            return None;
        }
        match keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER).and_then(|entry| entry.get_password()) {
            Ok(secret) => Some(secret),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(error = %e, "keyring lookup failed");
                None
            }
        }
    }

    /// Store the key in the keyring. `false` means the file must hold it.
    fn store_in_keyring(&self, username: &str) -> bool {
        if !self.keyring {
            return false;
        }
        match keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER).and_then(|entry| entry.set_password(username)) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "keyring unavailable; saving key to file");
                false
            }
        }
    }

    fn remove_from_keyring(&self) -> Result<(), ConfigError> {
        if !self.keyring {
            return Ok(());
        }
        match keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn read(&self, name: &str) -> Result<Option<String>, CoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.read_file()?;

        if name == keys::USERNAME {
            let username = resolve_username(
                self.username_override.clone(),
                self.keyring_username(),
                values.remove(name),
            );
            return Ok(username.map(|s| s.expose_secret().to_owned()));
        }
        Ok(values.remove(name))
    }

    fn write(&self, name: &str, value: &str) -> Result<(), CoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.read_file()?;

        if name == keys::USERNAME && self.store_in_keyring(value) {
            values.remove(name);
        } else {
            values.insert(name.to_owned(), value.to_owned());
        }
        Ok(self.write_file(&values)?)
    }

    fn remove(&self, name: &str) -> Result<(), CoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if name == keys::USERNAME {
            self.remove_from_keyring()?;
        }

        let mut values = self.read_file()?;
        if values.remove(name).is_some() {
            self.write_file(&values)?;
        }
        Ok(())
    }
}
