//! Credential Lookup Policy
//!
//! Decides when stored credentials are loaded into the username/password
//! fields and when the fields are left for manual entry.
//!
//! # States
//! - `Auto` (initial): selecting a data source loads its stored credentials,
//!   or clears the fields when nothing is stored or nothing is selected
//! - `Manual`: the user typed something; fields are never touched
//!
//! `Auto → Manual` when either field becomes non-empty, `Manual → Auto` when
//! both become empty again. Filling the fields from the store does not count
//! as typing and never changes the state.
//!
//! # Storage
//! Secrets live in a [`SecretStore`] under `"<namespace>:<dsn>"`. Passwords
//! are never written into a connection string or a data source entry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::connection_string::ConnectionString;
use crate::error::Result;

#[cfg(feature = "keyring")]
mod keyring_store;

#[cfg(feature = "keyring")]
pub use keyring_store::KeyringSecretStore;

/// Default secret store namespace
pub const DEFAULT_NAMESPACE: &str = "odbc-client";

/// Stored username and password for one data source
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Key/value secret storage
pub trait SecretStore: Send + Sync {
    /// Look up a credential; `Ok(None)` when nothing is stored
    fn get(&self, key: &str) -> Result<Option<Credential>>;

    /// Store or overwrite a credential
    fn set(&self, key: &str, credential: &Credential) -> Result<()>;

    /// Delete a credential; deleting a missing key is not an error
    fn delete(&self, key: &str) -> Result<()>;
}

/// Process-local secret store
#[derive(Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, Credential>>,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored credentials
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<Credential>> {
        Ok(self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned())
    }

    fn set(&self, key: &str, credential: &Credential) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), credential.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
        Ok(())
    }
}

impl fmt::Debug for MemorySecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySecretStore").field("len", &self.len()).finish()
    }
}

/// Credential auto-load state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    #[default]
    Auto,
    Manual,
}

/// Contents of the username and password fields
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialFields {
    pub username: String,
    pub password: String,
}

impl CredentialFields {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    /// Whether at least one field has text
    #[must_use]
    pub fn any_filled(&self) -> bool {
        !self.username.is_empty() || !self.password.is_empty()
    }

    pub fn clear(&mut self) {
        self.username.clear();
        self.password.clear();
    }
}

impl fmt::Debug for CredentialFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialFields")
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .finish()
    }
}

impl From<Credential> for CredentialFields {
    fn from(credential: Credential) -> Self {
        Self { username: credential.username, password: credential.password }
    }
}

/// State of the data source list when the selection changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DsnSelection<'a> {
    /// The list accepts selections (disabled while a "save as" name is typed)
    pub list_enabled: bool,

    /// Selected data source name
    pub selected: Option<&'a str>,
}

/// What a selection change did to the fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionEffect {
    /// Stored credentials were copied into the fields
    Loaded,
    /// Nothing stored or nothing selected; both fields were emptied
    Cleared,
    /// Manual mode or disabled list; fields left alone
    Untouched,
}

/// Credential auto-load state machine
#[derive(Debug)]
pub struct CredentialPolicy {
    namespace: String,
    mode: Mutex<LoadMode>,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl CredentialPolicy {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), mode: Mutex::new(LoadMode::Auto) }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn mode(&self) -> LoadMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Secret store key for a data source
    #[must_use]
    pub fn storage_key(&self, dsn: &str) -> String {
        format!("{}:{dsn}", self.namespace)
    }

    /// Feed a user edit of the username or password field
    pub fn observe_fields(&self, fields: &CredentialFields) -> LoadMode {
        let mut mode = self.mode.lock().unwrap_or_else(PoisonError::into_inner);
        let next = match *mode {
            LoadMode::Auto if fields.any_filled() => LoadMode::Manual,
            LoadMode::Manual if !fields.any_filled() => LoadMode::Auto,
            current => current,
        };
        if next != *mode {
            debug!(from = ?*mode, to = ?next, "Credential load mode changed");
            *mode = next;
        }
        next
    }

    /// React to a change of the data source selection
    ///
    /// A store lookup failure is logged and treated as "nothing stored".
    pub fn on_selection_changed(
        &self,
        store: &dyn SecretStore,
        selection: DsnSelection<'_>,
        fields: &mut CredentialFields,
    ) -> SelectionEffect {
        if self.mode() != LoadMode::Auto || !selection.list_enabled {
            return SelectionEffect::Untouched;
        }

        let stored = selection.selected.and_then(|dsn| {
            store.get(&self.storage_key(dsn)).unwrap_or_else(|e| {
                warn!(dsn, error = %e, "Credential lookup failed");
                None
            })
        });

        match stored {
            Some(credential) => {
                *fields = credential.into();
                SelectionEffect::Loaded
            }
            None => {
                fields.clear();
                SelectionEffect::Cleared
            }
        }
    }

    /// Data source the credentials of a connect attempt belong to
    ///
    /// The explicit "save as" name wins. Without one, typed credentials are
    /// attributed to the `DSN` of the connection string.
    pub fn credential_target(
        &self,
        explicit_name: &str,
        connection_string: &ConnectionString,
        fields: &CredentialFields,
    ) -> Option<String> {
        if !explicit_name.is_empty() {
            return Some(explicit_name.to_string());
        }
        if self.mode() == LoadMode::Manual && fields.any_filled() {
            return connection_string
                .extract_dsn()
                .filter(|dsn| !dsn.is_empty())
                .map(str::to_string);
        }
        None
    }

    /// Store the fields for a data source
    ///
    /// Empty fields are not stored.
    pub fn remember(
        &self,
        store: &dyn SecretStore,
        dsn: &str,
        fields: &CredentialFields,
    ) -> Result<bool> {
        if !fields.any_filled() {
            return Ok(false);
        }
        let credential =
            Credential { username: fields.username.clone(), password: fields.password.clone() };
        store.set(&self.storage_key(dsn), &credential)?;
        debug!(dsn, "Stored credentials");
        Ok(true)
    }

    /// Delete the stored credentials of a data source, if any
    pub fn forget(&self, store: &dyn SecretStore, dsn: &str) -> Result<bool> {
        let key = self.storage_key(dsn);
        if store.get(&key)?.is_none() {
            return Ok(false);
        }
        store.delete(&key)?;
        debug!(dsn, "Deleted stored credentials");
        Ok(true)
    }
}
