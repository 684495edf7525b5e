//! Data Source Registry
//!
//! Bridges to the driver manager's installer API to add, configure and remove
//! persisted data sources (DSNs) and to enumerate installed drivers and DSNs.
//!
//! # Layers
//! - [`DriverManager`]: the platform calls (driver-manager backend in
//!   `crate::odbc::installer`, test doubles elsewhere)
//! - [`DsnRegistry`]: the service used by the rest of the crate. It serializes
//!   every call (the driver manager is not assumed to be thread-safe), turns
//!   rejections into `RegistryRejected` and logs enumeration failures instead
//!   of raising them.
//!
//! # Staleness
//! Some platforms keep listing a data source right after it was removed.
//! Callers re-query once after a change and take that listing as ground truth.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::connection_string::DataSourceEntry;
use crate::error::{ClientError, Result};

/// Registry scope of a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Per-user data source
    User,
    /// Machine-wide data source
    System,
}

impl Scope {
    /// Get the scope name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which scopes a listing covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeFilter {
    /// User data sources only
    User,
    /// System data sources only
    System,
    /// User data sources followed by system data sources
    #[default]
    All,
}

impl ScopeFilter {
    fn scopes(self) -> &'static [Scope] {
        match self {
            Self::User => &[Scope::User],
            Self::System => &[Scope::System],
            Self::All => &[Scope::User, Scope::System],
        }
    }
}

/// Installer action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigAction {
    /// Create a data source
    Add,
    /// Edit a data source (the driver may show its setup dialog)
    Configure,
    /// Delete a data source
    Remove,
}

/// Installer request: action plus scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRequest {
    pub action: ConfigAction,
    pub scope: Scope,
}

impl ConfigRequest {
    #[must_use]
    pub const fn new(action: ConfigAction, scope: Scope) -> Self {
        Self { action, scope }
    }

    /// Request code passed to `SQLConfigDataSource`
    ///
    /// `ODBC_ADD_DSN` = 1 through `ODBC_REMOVE_SYS_DSN` = 6.
    #[must_use]
    pub const fn code(&self) -> u16 {
        let base = match self.action {
            ConfigAction::Add => 1,
            ConfigAction::Configure => 2,
            ConfigAction::Remove => 3,
        };
        match self.scope {
            Scope::User => base,
            Scope::System => base + 3,
        }
    }
}

/// Opaque parent window handle forwarded to driver dialogs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    /// No parent window (drivers run without UI where possible)
    pub const NONE: Self = Self(0);
}

/// A registered data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceDescriptor {
    /// Data source name
    pub name: String,

    /// Driver description as reported by the driver manager
    pub driver: String,

    /// Registry scope
    pub scope: Scope,
}

/// Raw driver-manager calls
///
/// Every call may fail without panicking. `config_data_source` and
/// `manage_data_sources` report plain success/failure; enumeration returns
/// `EnumerationFailed` when the fetch cursor stops on anything but `NO_DATA`.
pub trait DriverManager: Send {
    /// `SQLConfigDataSource` with an already encoded attribute block
    fn config_data_source(
        &self,
        window: WindowHandle,
        request: ConfigRequest,
        driver: &str,
        attribute_block: &str,
    ) -> bool;

    /// `SQLManageDataSources`: the driver manager's own administrator dialog
    fn manage_data_sources(&self, window: WindowHandle) -> bool;

    /// Enumerate data sources of one scope
    fn data_sources(&self, scope: Scope) -> Result<Vec<DataSourceDescriptor>>;

    /// Enumerate installed driver descriptions
    fn drivers(&self) -> Result<Vec<String>>;
}

/// Driver manager stand-in for builds without the `odbc` feature
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDriverManager;

impl DriverManager for NoDriverManager {
    fn config_data_source(&self, _: WindowHandle, _: ConfigRequest, _: &str, _: &str) -> bool {
        false
    }

    fn manage_data_sources(&self, _: WindowHandle) -> bool {
        false
    }

    fn data_sources(&self, _: Scope) -> Result<Vec<DataSourceDescriptor>> {
        Err(ClientError::unsupported("built without ODBC driver manager support"))
    }

    fn drivers(&self) -> Result<Vec<String>> {
        Err(ClientError::unsupported("built without ODBC driver manager support"))
    }
}

/// Encode a `;`-separated attribute string as a NUL-separated,
/// double-NUL-terminated attribute block
#[must_use]
pub fn encode_attribute_block(attributes: &str) -> String {
    let mut block: String = attributes
        .split(';')
        .filter(|attr| !attr.is_empty())
        .flat_map(|attr| attr.chars().chain(std::iter::once('\0')))
        .collect();
    if block.is_empty() {
        block.push('\0');
    }
    block.push('\0');
    block
}

/// Serialized access to the driver manager
pub struct DsnRegistry {
    manager: Mutex<Box<dyn DriverManager>>,
}

impl DsnRegistry {
    /// Wrap a driver manager backend
    pub fn new(manager: impl DriverManager + 'static) -> Self {
        Self { manager: Mutex::new(Box::new(manager)) }
    }

    fn with_manager<R>(&self, f: impl FnOnce(&dyn DriverManager) -> R) -> R {
        // A panic inside a previous call leaves no state behind in the guard
        let guard = self.manager.lock().unwrap_or_else(PoisonError::into_inner);
        f(guard.as_ref())
    }

    /// Issue an installer request
    ///
    /// `attributes` is a `;`-separated attribute string; it is encoded into
    /// the platform attribute block here.
    pub fn register_data_source(
        &self,
        window: WindowHandle,
        request: ConfigRequest,
        driver: &str,
        attributes: &str,
    ) -> Result<()> {
        let block = encode_attribute_block(attributes);
        let accepted =
            self.with_manager(|m| m.config_data_source(window, request, driver, &block));

        if accepted {
            debug!(code = request.code(), driver, "Driver manager accepted request");
            Ok(())
        } else {
            warn!(code = request.code(), driver, "Driver manager rejected request");
            Err(ClientError::registry_rejected(format!(
                "{:?} of a {} data source for driver '{driver}' failed",
                request.action, request.scope
            )))
        }
    }

    /// Create a data source from a merged entry
    pub fn add_data_source(
        &self,
        window: WindowHandle,
        scope: Scope,
        entry: &DataSourceEntry,
    ) -> Result<()> {
        self.register_data_source(
            window,
            ConfigRequest::new(ConfigAction::Add, scope),
            &entry.driver,
            &entry.attributes,
        )
    }

    /// Open the driver's configuration for an existing data source
    pub fn configure_data_source(&self, window: WindowHandle, name: &str) -> Result<()> {
        let descriptor = self.require_data_source(name)?;
        self.register_data_source(
            window,
            ConfigRequest::new(ConfigAction::Configure, descriptor.scope),
            &descriptor.driver,
            &format!("DSN={name}"),
        )
    }

    /// Delete a data source
    ///
    /// Does not re-query; callers refresh the listing once afterwards.
    pub fn remove_data_source(&self, window: WindowHandle, name: &str) -> Result<()> {
        let descriptor = self.require_data_source(name)?;
        self.register_data_source(
            window,
            ConfigRequest::new(ConfigAction::Remove, descriptor.scope),
            &descriptor.driver,
            &format!("DSN={name}"),
        )
    }

    /// Launch the driver manager's administrator dialog
    pub fn open_management_ui(&self, window: WindowHandle) -> Result<()> {
        if self.with_manager(|m| m.manage_data_sources(window)) {
            Ok(())
        } else {
            warn!("Unable to run the data source administrator");
            Err(ClientError::registry_rejected("unable to run the data source administrator"))
        }
    }

    /// Installed drivers; an enumeration failure is logged and yields an empty list
    pub fn list_drivers(&self) -> Vec<String> {
        self.with_manager(|m| m.drivers()).unwrap_or_else(|e| {
            warn!(error = %e, "Driver enumeration failed");
            Vec::new()
        })
    }

    /// Registered data sources, user scope before system scope
    ///
    /// A scope whose enumeration fails is logged and skipped.
    pub fn list_data_sources(&self, filter: ScopeFilter) -> Vec<DataSourceDescriptor> {
        self.with_manager(|m| {
            let mut listing = Vec::new();
            for &scope in filter.scopes() {
                match m.data_sources(scope) {
                    Ok(mut found) => listing.append(&mut found),
                    Err(e) => warn!(%scope, error = %e, "Data source enumeration failed"),
                }
            }
            listing
        })
    }

    /// Data source names as one flat namespace, first occurrence wins
    pub fn data_source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for descriptor in self.list_data_sources(ScopeFilter::All) {
            if !names.contains(&descriptor.name) {
                names.push(descriptor.name);
            }
        }
        names
    }

    /// Look up a data source by name (user scope shadows system scope)
    pub fn find_data_source(&self, name: &str) -> Option<DataSourceDescriptor> {
        self.list_data_sources(ScopeFilter::All).into_iter().find(|d| d.name == name)
    }

    fn require_data_source(&self, name: &str) -> Result<DataSourceDescriptor> {
        self.find_data_source(name)
            .ok_or_else(|| ClientError::invalid_input(format!("Data source '{name}' not found")))
    }
}

impl std::fmt::Debug for DsnRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DsnRegistry").finish_non_exhaustive()
    }
}
