//! Session Workflow
//!
//! Orchestrates the connect window's buttons: "Connect", "Remove DSN",
//! "Configure DSN" and "Manage", plus list refreshes.
//!
//! # Connect
//! 1. Parse the connection string (nothing changes on a parse error)
//! 2. With a "save as" name: register the data source (user scope). The
//!    password is never part of the registered attributes. A rejection is
//!    reported as a warning and the connect continues.
//! 3. Open the connection with the typed credentials
//! 4. When requested, store the credentials for the data source they belong to
//! 5. Query the connection summary and build the view title

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::view_settings_basename;
use crate::connection_string::{display_label, ConnectionString};
use crate::credentials::{CredentialFields, CredentialPolicy, SecretStore};
use crate::engine::{Connection, ConnectionSummary, Connector};
use crate::error::{ClientError, Result};
use crate::registry::{DataSourceDescriptor, DsnRegistry, Scope, ScopeFilter, WindowHandle};

/// Everything the connect window hands to [`Session::connect`]
#[derive(Debug, Clone, Default)]
pub struct ConnectRequest {
    pub connection_string: String,

    /// "Save as" name; empty to connect without registering
    pub data_source_name: String,

    pub credentials: CredentialFields,
    pub remember_credentials: bool,
}

/// An open connection and how to present it
pub struct ConnectedView {
    /// `<dsn>` or `<dsn>, ...`; `None` without a DSN
    pub label: Option<String>,

    pub title: String,
    pub dsn: Option<String>,

    /// Connection string without `DSN` and passwords
    pub extra: String,

    pub summary: ConnectionSummary,
    pub connection: Box<dyn Connection>,

    /// Non-fatal problems (registration rejected, credentials not stored, ...)
    pub warnings: Vec<String>,
}

impl ConnectedView {
    /// File name stem of the view settings for this connection
    #[must_use]
    pub fn settings_basename(&self) -> String {
        view_settings_basename(self.dsn.as_deref(), &self.extra)
    }
}

impl std::fmt::Debug for ConnectedView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedView")
            .field("title", &self.title)
            .field("dsn", &self.dsn)
            .field("extra", &self.extra)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

/// Result of removing a data source
#[derive(Debug, Clone, Serialize)]
pub struct RemovalReport {
    /// Driver manager rejection, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<String>,

    /// The data source still shows up in the refreshed listing
    pub still_listed: bool,

    /// Stored credentials were deleted
    pub credentials_removed: bool,

    /// Listing re-queried once after the removal
    pub data_sources: Vec<DataSourceDescriptor>,
}

/// Drivers and data sources after a refresh
#[derive(Debug, Clone, Default, Serialize)]
pub struct Listing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub drivers: Vec<String>,
    pub data_sources: Vec<DataSourceDescriptor>,
}

impl Listing {
    /// Data source names, first occurrence wins
    #[must_use]
    pub fn data_source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for descriptor in &self.data_sources {
            if !names.contains(&descriptor.name) {
                names.push(descriptor.name.clone());
            }
        }
        names
    }
}

/// View title: label or database name, read-only marker, product and version
#[must_use]
pub fn window_title(label: Option<&str>, summary: &ConnectionSummary) -> String {
    let mut title = match label {
        Some(label) => label.to_string(),
        None => summary.database_name.clone(),
    };
    if summary.read_only {
        title.push_str(" - Read Only");
    }
    title.push_str(&format!(" - {} {}", summary.dbms_name, summary.dbms_version));
    title
}

/// Connect-window workflow
pub struct Session {
    registry: Arc<DsnRegistry>,
    store: Arc<dyn SecretStore>,
    policy: Arc<CredentialPolicy>,
    connector: Box<dyn Connector>,
    window: WindowHandle,
}

impl Session {
    pub fn new(
        registry: Arc<DsnRegistry>,
        store: Arc<dyn SecretStore>,
        policy: Arc<CredentialPolicy>,
        connector: Box<dyn Connector>,
    ) -> Self {
        Self { registry, store, policy, connector, window: WindowHandle::NONE }
    }

    /// Parent window for driver dialogs
    #[must_use]
    pub const fn with_window(mut self, window: WindowHandle) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &DsnRegistry {
        &self.registry
    }

    #[must_use]
    pub fn policy(&self) -> &Arc<CredentialPolicy> {
        &self.policy
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    /// "Connect" button
    pub fn connect(&self, request: &ConnectRequest) -> Result<ConnectedView> {
        if request.connection_string.trim().is_empty() {
            return Err(ClientError::invalid_input("connection string is empty"));
        }
        let parsed = ConnectionString::parse(&request.connection_string)?;
        let mut warnings = Vec::new();

        if !request.data_source_name.is_empty() {
            if let Err(e) = self.register(&parsed, request) {
                warn!(name = %request.data_source_name, error = %e, "Data source not saved");
                warnings.push(e.message());
            }
        }

        let mut connection = self.connector.connect(&parsed, &request.credentials)?;

        if request.remember_credentials {
            let target = self.policy.credential_target(
                &request.data_source_name,
                &parsed,
                &request.credentials,
            );
            if let Some(target) = target {
                if let Err(e) = self.policy.remember(self.store.as_ref(), &target, &request.credentials) {
                    warn!(dsn = %target, error = %e, "Credentials not stored");
                    warnings.push(e.message());
                }
            }
        }

        let summary = ConnectionSummary::query(connection.as_mut()).unwrap_or_else(|e| {
            warn!(error = %e, "Connection summary unavailable");
            warnings.push(e.message());
            ConnectionSummary::default()
        });

        let (dsn, extra) = parsed.split_for_display();
        let label = display_label(dsn.as_deref(), &extra);
        let title = window_title(label.as_deref(), &summary);
        info!(title = %title, backend = connection.backend(), "Connected");

        Ok(ConnectedView { label, title, dsn, extra, summary, connection, warnings })
    }

    fn register(&self, parsed: &ConnectionString, request: &ConnectRequest) -> Result<()> {
        let entry = parsed
            .merge_for_persistence(&request.data_source_name, &request.credentials.username)?;
        self.registry.add_data_source(self.window, Scope::User, &entry)
    }

    /// "Remove DSN" button
    ///
    /// The listing is re-queried exactly once; credentials are deleted only
    /// when the data source is gone from that listing.
    pub fn remove_dsn(&self, name: &str) -> Result<RemovalReport> {
        let rejected = match self.registry.remove_data_source(self.window, name) {
            Ok(()) => None,
            Err(e @ ClientError::RegistryRejected(_)) => Some(e.message()),
            Err(e) => return Err(e),
        };

        let data_sources = self.registry.list_data_sources(ScopeFilter::All);
        let still_listed = data_sources.iter().any(|d| d.name == name);

        let credentials_removed = if still_listed {
            false
        } else {
            self.policy.forget(self.store.as_ref(), name).unwrap_or_else(|e| {
                warn!(dsn = name, error = %e, "Stored credentials not deleted");
                false
            })
        };

        Ok(RemovalReport { rejected, still_listed, credentials_removed, data_sources })
    }

    /// "Configure DSN" button
    pub fn configure_dsn(&self, name: &str) -> Result<()> {
        self.registry.configure_data_source(self.window, name)
    }

    /// "Manage" button: run the administrator, then refresh both lists
    pub fn open_manager(&self) -> Listing {
        let warning = self.registry.open_management_ui(self.window).err().map(|e| e.message());
        Listing { warning, ..self.refresh() }
    }

    /// Re-query drivers and data sources
    pub fn refresh(&self) -> Listing {
        Listing {
            warning: None,
            drivers: self.registry.list_drivers(),
            data_sources: self.registry.list_data_sources(ScopeFilter::All),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("window", &self.window).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(read_only: bool) -> ConnectionSummary {
        ConnectionSummary {
            read_only,
            dbms_name: "PostgreSQL".to_string(),
            dbms_version: "16.2".to_string(),
            database_name: "app".to_string(),
        }
    }

    #[test]
    fn test_window_title_with_label() {
        assert_eq!(window_title(Some("Sales"), &summary(false)), "Sales - PostgreSQL 16.2");
        assert_eq!(
            window_title(Some("Sales, ..."), &summary(true)),
            "Sales, ... - Read Only - PostgreSQL 16.2"
        );
    }

    #[test]
    fn test_window_title_falls_back_to_database() {
        assert_eq!(window_title(None, &summary(true)), "app - Read Only - PostgreSQL 16.2");
    }

    #[test]
    fn test_listing_names_are_unique() {
        let listing = Listing {
            warning: None,
            drivers: Vec::new(),
            data_sources: vec![
                DataSourceDescriptor {
                    name: "Sales".to_string(),
                    driver: "A".to_string(),
                    scope: Scope::User,
                },
                DataSourceDescriptor {
                    name: "Sales".to_string(),
                    driver: "B".to_string(),
                    scope: Scope::System,
                },
            ],
        };
        assert_eq!(listing.data_source_names(), vec!["Sales"]);
    }
}
