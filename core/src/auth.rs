//! Credential resolution for the memori CLI and SDK.
//!
//! Exactly one source supplies the API key per read, picked by a fixed
//! precedence: an in-process override, then the `MEMORI_API_KEY` environment
//! variable, then the OS keychain. Sources are never merged and a
//! lower-priority source is not consulted once a higher one matches.

use std::fmt;
use std::sync::Arc;

use memori_keyring_store::ACCOUNT_EMAIL_ACCOUNT;
use memori_keyring_store::API_KEY_ACCOUNT;
use memori_keyring_store::KeyringSecretStore;
use memori_keyring_store::SecretStore;
use memori_keyring_store::SecretStoreError;
use tracing::warn;

/// Environment variable carrying an explicit API key override.
pub const MEMORI_API_KEY_ENV_VAR: &str = "MEMORI_API_KEY";

/// When set to `1`, the OS keychain is never consulted on reads.
pub const MEMORI_DISABLE_KEYRING_ENV_VAR: &str = "MEMORI_DISABLE_KEYRING";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    /// Set programmatically for the current process, e.g. in tests or CI.
    Override,
    /// `MEMORI_API_KEY` from the environment.
    Env,
    /// The entry stored in the OS keychain.
    Keyring,
}

impl CredentialSource {
    pub fn describe(self) -> &'static str {
        match self {
            CredentialSource::Override => "an in-process override",
            CredentialSource::Env => "MEMORI_API_KEY from your environment",
            CredentialSource::Keyring => "credentials stored in your system keychain",
        }
    }
}

#[derive(Clone)]
pub struct ResolvedCredential {
    pub api_key: String,
    pub source: CredentialSource,
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("api_key", &"***")
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthStatus {
    Authenticated {
        email: Option<String>,
        source: CredentialSource,
    },
    NotAuthenticated,
}

/// Handle over the credential sources. Constructed once per process and
/// passed to whatever needs credentials; there is no ambient singleton.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    secrets: Arc<dyn SecretStore>,
    override_api_key: Option<String>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::with_secret_store(Arc::new(KeyringSecretStore))
    }

    pub fn with_secret_store(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            secrets,
            override_api_key: None,
        }
    }

    /// Pins the API key for this process, ahead of every other source.
    pub fn with_override(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.override_api_key = (!api_key.is_empty()).then_some(api_key);
        self
    }

    /// Resolves the active API key, if any. Keychain read failures degrade
    /// to "no credential": an unreadable keychain must not break read-only
    /// callers.
    pub fn resolve(&self) -> Option<ResolvedCredential> {
        resolve_credential(
            self.secrets.as_ref(),
            self.override_api_key.as_deref(),
            env_api_key().as_deref(),
            keyring_disabled(),
        )
    }

    /// Display email from the keychain. None when the keychain is disabled,
    /// unavailable, or has no entry.
    pub fn account_email(&self) -> Option<String> {
        if keyring_disabled() {
            return None;
        }
        match self.secrets.load(ACCOUNT_EMAIL_ACCOUNT) {
            Ok(email) => email,
            Err(error) => {
                warn!("failed to read account email from keychain: {error}");
                None
            }
        }
    }

    /// Persists the issued credential. The email entry is best-effort once
    /// the key itself is stored.
    pub fn save(&self, api_key: &str, email: Option<&str>) -> Result<(), SecretStoreError> {
        self.secrets.save(API_KEY_ACCOUNT, api_key)?;
        if let Some(email) = email
            && let Err(error) = self.secrets.save(ACCOUNT_EMAIL_ACCOUNT, email)
        {
            warn!("failed to store account email in keychain: {error}");
        }
        Ok(())
    }

    /// Removes the keychain entries. Returns whether an API key entry
    /// existed. Absence is not an error, and an active `MEMORI_API_KEY`
    /// override is left intact: callers are expected to tell the user.
    pub fn logout(&self) -> Result<bool, SecretStoreError> {
        let removed = self.secrets.delete(API_KEY_ACCOUNT)?;
        if let Err(error) = self.secrets.delete(ACCOUNT_EMAIL_ACCOUNT) {
            warn!("failed to remove account email from keychain: {error}");
        }
        Ok(removed)
    }

    /// Whether `MEMORI_API_KEY` is currently set (non-empty).
    pub fn env_override_active() -> bool {
        env_api_key().is_some()
    }

    pub fn status(&self) -> AuthStatus {
        match self.resolve() {
            Some(ResolvedCredential { source, .. }) => AuthStatus::Authenticated {
                email: self.account_email(),
                source,
            },
            None => AuthStatus::NotAuthenticated,
        }
    }
}

fn resolve_credential(
    secrets: &dyn SecretStore,
    override_key: Option<&str>,
    env_key: Option<&str>,
    keyring_disabled: bool,
) -> Option<ResolvedCredential> {
    if let Some(api_key) = override_key {
        return Some(ResolvedCredential {
            api_key: api_key.to_string(),
            source: CredentialSource::Override,
        });
    }

    if let Some(api_key) = env_key {
        return Some(ResolvedCredential {
            api_key: api_key.to_string(),
            source: CredentialSource::Env,
        });
    }

    if keyring_disabled {
        return None;
    }

    match secrets.load(API_KEY_ACCOUNT) {
        Ok(Some(api_key)) if !api_key.is_empty() => Some(ResolvedCredential {
            api_key,
            source: CredentialSource::Keyring,
        }),
        Ok(_) => None,
        Err(error) => {
            warn!("failed to read API key from keychain: {error}");
            None
        }
    }
}

fn env_api_key() -> Option<String> {
    crate::config::env_string(MEMORI_API_KEY_ENV_VAR)
}

fn keyring_disabled() -> bool {
    std::env::var(MEMORI_DISABLE_KEYRING_ENV_VAR).as_deref() == Ok("1")
}
