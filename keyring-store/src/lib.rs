use keyring::Entry;
use keyring::Error as KeyringError;
use std::error::Error;
use std::fmt;
use std::fmt::Debug;
use tracing::trace;

/// Keychain service namespace shared by every memori credential entry.
pub const SERVICE_NAME: &str = "memori";

/// Account name of the API key entry within [`SERVICE_NAME`].
pub const API_KEY_ACCOUNT: &str = "api_key";

/// Account name of the display-only email entry within [`SERVICE_NAME`].
pub const ACCOUNT_EMAIL_ACCOUNT: &str = "account_email";

#[derive(Debug)]
pub enum SecretStoreError {
    Other(KeyringError),
}

impl SecretStoreError {
    pub fn new(error: KeyringError) -> Self {
        Self::Other(error)
    }

    pub fn message(&self) -> String {
        match self {
            Self::Other(error) => error.to_string(),
        }
    }
}

impl fmt::Display for SecretStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(error) => write!(f, "{error}"),
        }
    }
}

impl Error for SecretStoreError {}

/// OS secure-store seam. All entries live under the fixed [`SERVICE_NAME`]
/// namespace; callers address them by account name only.
pub trait SecretStore: Debug + Send + Sync {
    fn load(&self, account: &str) -> Result<Option<String>, SecretStoreError>;
    fn save(&self, account: &str, value: &str) -> Result<(), SecretStoreError>;
    /// Returns true when an entry existed and was removed. Absence is not an
    /// error.
    fn delete(&self, account: &str) -> Result<bool, SecretStoreError>;
}

#[derive(Debug)]
pub struct KeyringSecretStore;

impl SecretStore for KeyringSecretStore {
    fn load(&self, account: &str) -> Result<Option<String>, SecretStoreError> {
        trace!("keyring.load start, account={account}");
        let entry = Entry::new(SERVICE_NAME, account).map_err(SecretStoreError::new)?;
        match entry.get_password() {
            Ok(value) => {
                trace!("keyring.load success, account={account}");
                Ok(Some(value))
            }
            Err(KeyringError::NoEntry) => {
                trace!("keyring.load no entry, account={account}");
                Ok(None)
            }
            Err(error) => {
                trace!("keyring.load error, account={account}, error={error}");
                Err(SecretStoreError::new(error))
            }
        }
    }

    fn save(&self, account: &str, value: &str) -> Result<(), SecretStoreError> {
        trace!(
            "keyring.save start, account={account}, value_len={}",
            value.len()
        );
        let entry = Entry::new(SERVICE_NAME, account).map_err(SecretStoreError::new)?;
        match entry.set_password(value) {
            Ok(()) => {
                trace!("keyring.save success, account={account}");
                Ok(())
            }
            Err(error) => {
                trace!("keyring.save error, account={account}, error={error}");
                Err(SecretStoreError::new(error))
            }
        }
    }

    fn delete(&self, account: &str) -> Result<bool, SecretStoreError> {
        trace!("keyring.delete start, account={account}");
        let entry = Entry::new(SERVICE_NAME, account).map_err(SecretStoreError::new)?;
        match entry.delete_credential() {
            Ok(()) => {
                trace!("keyring.delete success, account={account}");
                Ok(true)
            }
            Err(KeyringError::NoEntry) => {
                trace!("keyring.delete no entry, account={account}");
                Ok(false)
            }
            Err(error) => {
                trace!("keyring.delete error, account={account}, error={error}");
                Err(SecretStoreError::new(error))
            }
        }
    }
}

pub mod tests {
    use super::SecretStore;
    use super::SecretStoreError;
    use keyring::Error as KeyringError;
    use keyring::credential::CredentialApi as _;
    use keyring::mock::MockCredential;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::PoisonError;

    #[derive(Default, Clone, Debug)]
    pub struct MockSecretStore {
        credentials: Arc<Mutex<HashMap<String, Arc<MockCredential>>>>,
    }

    impl MockSecretStore {
        pub fn credential(&self, account: &str) -> Arc<MockCredential> {
            let mut guard = self
                .credentials
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard
                .entry(account.to_string())
                .or_insert_with(|| Arc::new(MockCredential::default()))
                .clone()
        }

        pub fn saved_value(&self, account: &str) -> Option<String> {
            let credential = {
                let guard = self
                    .credentials
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                guard.get(account).cloned()
            }?;
            credential.get_password().ok()
        }

        /// Arms the given account so the next keyring operation on it fails.
        pub fn set_error(&self, account: &str, error: KeyringError) {
            let credential = self.credential(account);
            credential.set_error(error);
        }

        pub fn contains(&self, account: &str) -> bool {
            let guard = self
                .credentials
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.contains_key(account)
        }
    }

    impl SecretStore for MockSecretStore {
        fn load(&self, account: &str) -> Result<Option<String>, SecretStoreError> {
            let credential = {
                let guard = self
                    .credentials
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                guard.get(account).cloned()
            };

            let Some(credential) = credential else {
                return Ok(None);
            };

            match credential.get_password() {
                Ok(value) => Ok(Some(value)),
                Err(KeyringError::NoEntry) => Ok(None),
                Err(error) => Err(SecretStoreError::new(error)),
            }
        }

        fn save(&self, account: &str, value: &str) -> Result<(), SecretStoreError> {
            let credential = self.credential(account);
            credential
                .set_password(value)
                .map_err(SecretStoreError::new)
        }

        fn delete(&self, account: &str) -> Result<bool, SecretStoreError> {
            let credential = {
                let guard = self
                    .credentials
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                guard.get(account).cloned()
            };

            let Some(credential) = credential else {
                return Ok(false);
            };

            let removed = match credential.delete_credential() {
                Ok(()) => Ok(true),
                Err(KeyringError::NoEntry) => Ok(false),
                Err(error) => Err(SecretStoreError::new(error)),
            }?;

            let mut guard = self
                .credentials
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.remove(account);
            Ok(removed)
        }
    }
}
