//! Connection Dialog Model
//!
//! The state behind the connect window, without any widgets: the connection
//! string box, the "save as" name box, the username/password boxes, and the
//! driver and data source lists. A UI layer forwards user events to the
//! methods below and re-renders from the accessors.
//!
//! # List behavior
//! - Selecting a data source writes `DSN=<name>` into the connection string
//!   (replacing any `DSN`/`Driver`), deselects the driver and lets the
//!   credential policy fill or clear the credential fields
//! - Selecting a driver writes `Driver=<name>` and deselects the data source
//! - Typing a "save as" name disables and deselects the data source list

use std::sync::Arc;

use crate::connection_string::{remove_key_value, replace_key, DRIVER_KEY, DSN_KEY};
use crate::credentials::{
    CredentialFields, CredentialPolicy, DsnSelection, LoadMode, SecretStore, SelectionEffect,
};
use crate::error::{ClientError, Result};
use crate::session::ConnectRequest;

/// Connect window state
pub struct ConnectionDialog {
    policy: Arc<CredentialPolicy>,
    store: Arc<dyn SecretStore>,

    connection_string: String,
    data_source_name: String,
    credentials: CredentialFields,
    remember_credentials: bool,

    drivers: Vec<String>,
    data_sources: Vec<String>,
    selected_driver: Option<usize>,
    selected_data_source: Option<usize>,
    data_source_list_enabled: bool,
}

impl ConnectionDialog {
    pub fn new(policy: Arc<CredentialPolicy>, store: Arc<dyn SecretStore>) -> Self {
        Self {
            policy,
            store,
            connection_string: String::new(),
            data_source_name: String::new(),
            credentials: CredentialFields::default(),
            remember_credentials: true,
            drivers: Vec::new(),
            data_sources: Vec::new(),
            selected_driver: None,
            selected_data_source: None,
            data_source_list_enabled: true,
        }
    }

    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    #[must_use]
    pub fn data_source_name(&self) -> &str {
        &self.data_source_name
    }

    #[must_use]
    pub const fn credentials(&self) -> &CredentialFields {
        &self.credentials
    }

    #[must_use]
    pub const fn remember_credentials(&self) -> bool {
        self.remember_credentials
    }

    #[must_use]
    pub fn drivers(&self) -> &[String] {
        &self.drivers
    }

    #[must_use]
    pub fn data_sources(&self) -> &[String] {
        &self.data_sources
    }

    #[must_use]
    pub fn selected_driver(&self) -> Option<&str> {
        self.selected_driver.map(|idx| self.drivers[idx].as_str())
    }

    #[must_use]
    pub fn selected_data_source(&self) -> Option<&str> {
        self.selected_data_source.map(|idx| self.data_sources[idx].as_str())
    }

    #[must_use]
    pub const fn data_source_list_enabled(&self) -> bool {
        self.data_source_list_enabled
    }

    pub fn load_mode(&self) -> LoadMode {
        self.policy.mode()
    }

    /// Connection string box edited
    pub fn set_connection_string(&mut self, text: impl Into<String>) {
        self.connection_string = text.into();
    }

    /// "Save as" box edited
    pub fn set_data_source_name(&mut self, name: impl Into<String>) {
        self.data_source_name = name.into();
        if self.data_source_name.is_empty() {
            self.data_source_list_enabled = true;
        } else if self.data_source_list_enabled {
            self.data_source_list_enabled = false;
            self.selected_data_source = None;
        }
    }

    /// Username box edited
    pub fn set_username(&mut self, username: impl Into<String>) {
        self.credentials.username = username.into();
        self.policy.observe_fields(&self.credentials);
    }

    /// Password box edited
    pub fn set_password(&mut self, password: impl Into<String>) {
        self.credentials.password = password.into();
        self.policy.observe_fields(&self.credentials);
    }

    pub fn set_remember_credentials(&mut self, remember: bool) {
        self.remember_credentials = remember;
    }

    /// A data source was clicked
    pub fn select_data_source(&mut self, name: &str) -> Result<SelectionEffect> {
        if !self.data_source_list_enabled {
            return Ok(SelectionEffect::Untouched);
        }
        let idx = self
            .data_sources
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| ClientError::invalid_input(format!("Unknown data source '{name}'")))?;

        self.selected_data_source = Some(idx);
        self.selected_driver = None;
        self.connection_string = replace_key(&self.connection_string, DSN_KEY, name);
        Ok(self.load_credentials())
    }

    /// The selected data source was deselected by the user
    pub fn clear_data_source_selection(&mut self) -> SelectionEffect {
        if let Some(name) = self.selected_data_source().map(str::to_string) {
            self.connection_string = remove_key_value(&self.connection_string, DSN_KEY, &name);
        }
        self.selected_data_source = None;
        self.load_credentials()
    }

    /// A driver was clicked
    pub fn select_driver(&mut self, name: &str) -> Result<SelectionEffect> {
        let idx = self
            .drivers
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| ClientError::invalid_input(format!("Unknown driver '{name}'")))?;

        self.selected_driver = Some(idx);
        self.connection_string = replace_key(&self.connection_string, DRIVER_KEY, name);

        if self.selected_data_source.take().is_some() {
            return Ok(self.load_credentials());
        }
        Ok(SelectionEffect::Untouched)
    }

    /// The selected driver was deselected by the user
    pub fn clear_driver_selection(&mut self) {
        if let Some(name) = self.selected_driver().map(str::to_string) {
            self.connection_string = remove_key_value(&self.connection_string, DRIVER_KEY, &name);
        }
        self.selected_driver = None;
    }

    /// Replace the list contents when the listing changed
    ///
    /// Selections survive by name. Returns whether anything changed.
    pub fn refresh_lists(&mut self, drivers: Vec<String>, data_sources: Vec<String>) -> bool {
        let mut changed = false;

        if drivers != self.drivers {
            let selected = self.selected_driver().map(str::to_string);
            self.selected_driver = selected.and_then(|s| drivers.iter().position(|d| *d == s));
            self.drivers = drivers;
            changed = true;
        }

        if data_sources != self.data_sources {
            let selected = self.selected_data_source().map(str::to_string);
            self.selected_data_source =
                selected.and_then(|s| data_sources.iter().position(|d| *d == s));
            self.data_sources = data_sources;
            changed = true;
        }

        changed
    }

    /// Snapshot of the fields for [`crate::session::Session::connect`]
    #[must_use]
    pub fn connect_request(&self) -> ConnectRequest {
        ConnectRequest {
            connection_string: self.connection_string.clone(),
            data_source_name: self.data_source_name.clone(),
            credentials: self.credentials.clone(),
            remember_credentials: self.remember_credentials,
        }
    }

    fn load_credentials(&mut self) -> SelectionEffect {
        let selected = self.selected_data_source.map(|idx| self.data_sources[idx].clone());
        let selection = DsnSelection {
            list_enabled: self.data_source_list_enabled,
            selected: selected.as_deref(),
        };
        self.policy.on_selection_changed(self.store.as_ref(), selection, &mut self.credentials)
    }
}

impl std::fmt::Debug for ConnectionDialog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDialog")
            .field("connection_string", &self.connection_string)
            .field("data_source_name", &self.data_source_name)
            .field("credentials", &self.credentials)
            .field("selected_driver", &self.selected_driver())
            .field("selected_data_source", &self.selected_data_source())
            .finish_non_exhaustive()
    }
}
