use crate::domain::models::OAuthToken;
use crate::infrastructure::config::CredentialBackend;
use crate::infrastructure::error::InfraError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Persistence for the single process-wide OAuth token.
///
/// `load_token` reports an unreadable or corrupt token as absent after
/// removing it, so callers fall through to re-authorization.
pub trait CredentialStore: Send + Sync {
    fn save_token(&self, token: &OAuthToken) -> Result<(), InfraError>;
    fn load_token(&self) -> Result<Option<OAuthToken>, InfraError>;
    fn delete_token(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn save_token(&self, token: &OAuthToken) -> Result<(), InfraError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(token)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, format!("{payload}\n"))?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }

    fn load_token(&self) -> Result<Option<OAuthToken>, InfraError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        match serde_json::from_slice::<OAuthToken>(&raw) {
            Ok(token) => Ok(Some(token)),
            Err(error) => {
                warn!(path = %self.path.display(), %error, "discarding corrupt token file");
                self.delete_token()?;
                Ok(None)
            }
        }
    }

    fn delete_token(&self) -> Result<(), InfraError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
    account_name: String,
}

impl KeyringCredentialStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new("taskcal.oauth.google", "default")
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save_token(&self, token: &OAuthToken) -> Result<(), InfraError> {
        let payload =
            serde_json::to_string(token).map_err(|error| InfraError::Credential(error.to_string()))?;
        self.entry()?
            .set_password(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_token(&self) -> Result<Option<OAuthToken>, InfraError> {
        let payload = match self.entry()?.get_password() {
            Ok(value) => value,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(error) => return Err(InfraError::Credential(error.to_string())),
        };

        match serde_json::from_str::<OAuthToken>(&payload) {
            Ok(token) => Ok(Some(token)),
            Err(error) => {
                warn!(service = %self.service_name, %error, "discarding corrupt keyring token");
                self.delete_token()?;
                Ok(None)
            }
        }
    }

    fn delete_token(&self) -> Result<(), InfraError> {
        match self.entry()?.delete_credential() {
            Ok(_) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

/// Store picked at startup from `credentialStore` in `app.json`.
#[derive(Debug, Clone)]
pub enum ConfiguredCredentialStore {
    File(FileCredentialStore),
    Keyring(KeyringCredentialStore),
}

impl ConfiguredCredentialStore {
    pub fn new(backend: CredentialBackend, token_path: impl AsRef<Path>) -> Self {
        match backend {
            CredentialBackend::File => Self::File(FileCredentialStore::new(token_path)),
            CredentialBackend::Keyring => Self::Keyring(KeyringCredentialStore::default()),
        }
    }

    fn inner(&self) -> &dyn CredentialStore {
        match self {
            Self::File(store) => store,
            Self::Keyring(store) => store,
        }
    }
}

impl CredentialStore for ConfiguredCredentialStore {
    fn save_token(&self, token: &OAuthToken) -> Result<(), InfraError> {
        self.inner().save_token(token)
    }

    fn load_token(&self) -> Result<Option<OAuthToken>, InfraError> {
        self.inner().load_token()
    }

    fn delete_token(&self) -> Result<(), InfraError> {
        self.inner().delete_token()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    token: Mutex<Option<OAuthToken>>,
}

impl InMemoryCredentialStore {
    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<OAuthToken>>, InfraError> {
        self.token
            .lock()
            .map_err(|_| InfraError::Credential("in-memory token slot poisoned".to_string()))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_token(&self, token: &OAuthToken) -> Result<(), InfraError> {
        *self.slot()? = Some(token.clone());
        Ok(())
    }

    fn load_token(&self) -> Result<Option<OAuthToken>, InfraError> {
        Ok(self.slot()?.clone())
    }

    fn delete_token(&self) -> Result<(), InfraError> {
        self.slot()?.take();
        Ok(())
    }
}
