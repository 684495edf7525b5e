//! Driver-manager installer and enumeration backend

use std::ffi::c_void;

use odbc_api::{DataSourceInfo, DriverInfo};
use tracing::debug;

use super::{environment, to_wide};
use crate::error::{ClientError, Result};
use crate::registry::{ConfigRequest, DataSourceDescriptor, DriverManager, Scope, WindowHandle};

// Installer API (odbccp32 / libodbcinst); not covered by odbc-api
#[cfg_attr(windows, link(name = "odbccp32"))]
#[cfg_attr(not(windows), link(name = "odbcinst"))]
extern "system" {
    fn SQLConfigDataSourceW(
        hwnd_parent: *mut c_void,
        request: u16,
        driver: *const u16,
        attributes: *const u16,
    ) -> i32;

    fn SQLManageDataSources(hwnd: *mut c_void) -> i32;
}

/// [`DriverManager`] backed by `odbc32`/`odbccp32` or unixODBC
#[derive(Debug, Clone, Copy, Default)]
pub struct OdbcDriverManager;

impl OdbcDriverManager {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn window_ptr(window: WindowHandle) -> *mut c_void {
    window.0 as *mut c_void
}

fn descriptors(found: Vec<DataSourceInfo>, scope: Scope) -> Vec<DataSourceDescriptor> {
    found
        .into_iter()
        .map(|info| DataSourceDescriptor { name: info.server_name, driver: info.driver, scope })
        .collect()
}

fn driver_names(found: Vec<DriverInfo>) -> Vec<String> {
    found.into_iter().map(|info| info.description).collect()
}

fn enumeration_error(call: &str, e: &odbc_api::Error) -> ClientError {
    ClientError::enumeration_failed(format!("{call}: {e}"))
}

impl DriverManager for OdbcDriverManager {
    fn config_data_source(
        &self,
        window: WindowHandle,
        request: ConfigRequest,
        driver: &str,
        attribute_block: &str,
    ) -> bool {
        let driver = to_wide(driver);
        // The block already ends in NUL NUL; no extra terminator needed
        let attributes: Vec<u16> = attribute_block.encode_utf16().collect();

        // SAFETY: both buffers are NUL terminated and outlive the call
        let ok = unsafe {
            SQLConfigDataSourceW(
                window_ptr(window),
                request.code(),
                driver.as_ptr(),
                attributes.as_ptr(),
            )
        };
        ok != 0
    }

    fn manage_data_sources(&self, window: WindowHandle) -> bool {
        // SAFETY: plain call with an opaque window handle
        unsafe { SQLManageDataSources(window_ptr(window)) != 0 }
    }

    fn data_sources(&self, scope: Scope) -> Result<Vec<DataSourceDescriptor>> {
        let env = environment()?;
        let found = match scope {
            Scope::User => env.user_data_sources(),
            Scope::System => env.system_data_sources(),
        }
        .map_err(|e| enumeration_error("SQLDataSources", &e))?;

        debug!(%scope, count = found.len(), "Data sources enumerated");
        Ok(descriptors(found, scope))
    }

    fn drivers(&self) -> Result<Vec<String>> {
        let found = environment()?.drivers().map_err(|e| enumeration_error("SQLDrivers", &e))?;
        debug!(count = found.len(), "Drivers enumerated");
        Ok(driver_names(found))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_descriptors_keep_scope_and_order() {
        let found = vec![
            DataSourceInfo { server_name: "Sales".to_string(), driver: "PostgreSQL".to_string() },
            DataSourceInfo { server_name: "Audit".to_string(), driver: "SQLite3".to_string() },
        ];

        let listed = descriptors(found, Scope::System);

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "Sales");
        assert_eq!(listed[1].driver, "SQLite3");
        assert!(listed.iter().all(|d| d.scope == Scope::System));
    }

    #[test]
    fn test_driver_names_use_description() {
        let found = vec![DriverInfo {
            description: "SQLite3".to_string(),
            attributes: HashMap::from([("Driver".to_string(), "libsqlite3odbc.so".to_string())]),
        }];
        assert_eq!(driver_names(found), vec!["SQLite3"]);
    }
}
