//! OS credential store backend
//!
//! One entry per key; username and password are kept together as a JSON
//! secret so that a lookup is a single store round trip.

use keyring::Entry;

use super::{Credential, SecretStore};
use crate::error::{ClientError, Result};

const ENTRY_USER: &str = "credentials";

/// Secret store backed by the platform keychain / credential manager / keyring
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringSecretStore;

impl KeyringSecretStore {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn entry(key: &str) -> Result<Entry> {
    Entry::new(key, ENTRY_USER)
        .map_err(|e| ClientError::secret_store(format!("Invalid credential entry '{key}': {e}")))
}

impl SecretStore for KeyringSecretStore {
    fn get(&self, key: &str) -> Result<Option<Credential>> {
        match entry(key)?.get_password() {
            Ok(secret) => serde_json::from_str(&secret).map(Some).map_err(|e| {
                ClientError::secret_store(format!("Stored credential for '{key}' is unreadable: {e}"))
            }),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(ClientError::secret_store(format!("Lookup of '{key}' failed: {e}"))),
        }
    }

    fn set(&self, key: &str, credential: &Credential) -> Result<()> {
        let secret = serde_json::to_string(credential)
            .map_err(|e| ClientError::secret_store(format!("Failed to encode credential: {e}")))?;
        entry(key)?
            .set_password(&secret)
            .map_err(|e| ClientError::secret_store(format!("Saving '{key}' failed: {e}")))
    }

    fn delete(&self, key: &str) -> Result<()> {
        match entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(ClientError::secret_store(format!("Deleting '{key}' failed: {e}"))),
        }
    }
}
