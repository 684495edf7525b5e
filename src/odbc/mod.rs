//! ODBC Driver-Manager Backend
//!
//! Environment, connections, statements and enumeration come from
//! `odbc-api`. The installer entry points (`SQLConfigDataSourceW`,
//! `SQLManageDataSources`) and `SQLProceduresW` are not wrapped there and
//! are declared locally. Kept behind the `odbc` feature because linking
//! requires the driver manager to be installed.
//!
//! # Modules
//! - `installer`: [`OdbcDriverManager`], the registry backend
//! - `connection`: [`OdbcConnector`] and [`OdbcConnection`]
//! - `rows`: cursor-to-row plumbing shared by both

mod connection;
mod installer;
mod rows;

use std::sync::OnceLock;

use odbc_api::Environment;

use crate::error::{ClientError, Result};

pub use connection::{OdbcConnection, OdbcConnector};
pub use installer::OdbcDriverManager;
pub use rows::{RowSource, TextRows};

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

/// Process-wide ODBC 3 environment, created on first use
pub fn environment() -> Result<&'static Environment> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }
    let env = Environment::new().map_err(|e| {
        ClientError::connection_failed(format!("Failed to allocate ODBC environment: {e}"))
    })?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

/// NUL-terminated UTF-16 copy of `text`
#[must_use]
pub fn to_wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Decode up to `len` characters of a UTF-16 buffer (clamped, stops at NUL)
#[must_use]
pub fn from_wide(buffer: &[u16], len: usize) -> String {
    let slice = &buffer[..len.min(buffer.len())];
    let end = slice.iter().position(|&c| c == 0).unwrap_or(slice.len());
    String::from_utf16_lossy(&slice[..end])
}
