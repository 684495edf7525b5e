//! Configuration Management
//!
//! This module handles loading and saving the client configuration and the
//! per-connection view settings.
//!
//! # Configuration Locations
//! - Local: `.odbc-client/config.json` (per project directory)
//! - Global: `~/.config/odbc-client/config.json` (per user)
//! - View settings: `~/.config/odbc-client/views/<basename>.json`
//!
//! # Resolution Precedence
//! 1. Local config file, when present
//! 2. Global config file
//! 3. Built-in defaults
//!
//! # View settings file names
//! Keyed by the data source name (`conn` without one) plus a CRC-64/ECMA-182
//! of the remaining connection string, so that two connections to the same
//! data source with different options keep separate histories. Passwords are
//! never part of the hashed string.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::credentials::DEFAULT_NAMESPACE;
use crate::error::{ClientError, Result};

/// Application directory name
pub const APP_DIR: &str = "odbc-client";

/// Maximum number of statements kept in a view's history
pub const HISTORY_LIMIT: usize = 50;

const CONFIG_FILE: &str = "config.json";
const LOCAL_DIR: &str = ".odbc-client";
const VIEWS_DIR: &str = "views";

const CRC64: crc::Crc<u64> = crc::Crc::<u64>::new(&crc::CRC_64_ECMA_182);

/// Global client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Secret store namespace credentials are kept under
    pub credential_namespace: String,

    /// Default of the "remember credentials" box
    pub remember_credentials: bool,

    /// `tracing` filter directive (e.g. `odbc_client=debug`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            credential_namespace: DEFAULT_NAMESPACE.to_string(),
            remember_credentials: true,
            log_filter: None,
        }
    }
}

/// Per-connection view settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    /// Executed statements, most recent last
    pub history: Vec<String>,
}

impl ViewSettings {
    /// Append a statement, dropping an identical earlier entry and the oldest
    /// entries beyond [`HISTORY_LIMIT`]
    pub fn record_statement(&mut self, sql: &str) {
        let sql = sql.trim();
        if sql.is_empty() {
            return;
        }
        self.history.retain(|entry| entry != sql);
        self.history.push(sql.to_string());
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }
}

/// Get path to the user configuration directory (`~/.config/odbc-client`)
pub fn config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ClientError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join(APP_DIR))
}

/// Get path to the global config file
pub fn global_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Get path to the local config file (`.odbc-client/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        ClientError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(LOCAL_DIR).join(CONFIG_FILE))
}

/// Get path to the view settings file of a connection
pub fn view_settings_path(basename: &str) -> Result<PathBuf> {
    Ok(config_dir()?.join(VIEWS_DIR).join(format!("{basename}.json")))
}

/// File name stem of a connection's view settings
///
/// `<dsn>` or `conn`, plus `-<16 hex digits>` when `extra` is non-empty.
/// Characters that are unsafe in file names are replaced by `_`.
#[must_use]
pub fn view_settings_basename(dsn: Option<&str>, extra: &str) -> String {
    let stem = dsn.filter(|d| !d.is_empty()).unwrap_or("conn");
    let mut basename: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') { c } else { '_' })
        .collect();

    if !extra.is_empty() {
        basename.push_str(&format!("-{:016x}", CRC64.checksum(extra.as_bytes())));
    }
    basename
}

/// Load a JSON settings file; a missing file yields the defaults
pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ClientError::config_error(format!("Could not read {}: {e}", path.display()))
    })?;

    serde_json::from_str(&contents).map_err(|e| {
        ClientError::config_error(format!("Invalid settings file {}: {e}", path.display()))
    })
}

/// Save a JSON settings file, creating parent directories
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            ClientError::config_error(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(value)
        .map_err(|e| ClientError::config_error(format!("Could not serialize settings: {e}")))?;

    fs::write(path, contents).map_err(|e| {
        ClientError::config_error(format!("Could not write {}: {e}", path.display()))
    })
}

/// Load the client config from an explicit path
pub fn load_client_config(path: &Path) -> Result<ClientConfig> {
    load_json(path)
}

/// Save the client config to an explicit path
pub fn save_client_config(path: &Path, config: &ClientConfig) -> Result<()> {
    save_json(path, config)
}

/// Load the client config with precedence (local file, then global file)
pub fn load_client_config_with_precedence() -> Result<ClientConfig> {
    let local_path = local_config_path()?;
    if local_path.exists() {
        return load_client_config(&local_path);
    }
    load_client_config(&global_config_path()?)
}

/// Load the view settings stored under `basename`
pub fn load_view_settings(basename: &str) -> Result<ViewSettings> {
    load_json(&view_settings_path(basename)?)
}

/// Save the view settings under `basename`
pub fn save_view_settings(basename: &str, settings: &ViewSettings) -> Result<()> {
    save_json(&view_settings_path(basename)?, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join("odbc_client_config_tests").join(name)
    }

    #[test]
    fn test_basename_without_extra() {
        assert_eq!(view_settings_basename(Some("Sales"), ""), "Sales");
        assert_eq!(view_settings_basename(None, ""), "conn");
        assert_eq!(view_settings_basename(Some(""), ""), "conn");
    }

    #[test]
    fn test_basename_crc64_ecma() {
        // CRC-64/ECMA-182 check value
        assert_eq!(view_settings_basename(None, "123456789"), "conn-6c40df5f0b497347");

        let basename = view_settings_basename(Some("Sales"), "UID=bob;Timeout=30");
        assert!(basename.starts_with("Sales-"));
        assert_eq!(basename.len(), "Sales-".len() + 16);
        assert_ne!(basename, view_settings_basename(Some("Sales"), "UID=alice;Timeout=30"));
    }

    #[test]
    fn test_basename_sanitizes_separators() {
        assert_eq!(view_settings_basename(Some("a/b\\c:d"), ""), "a_b_c_d");
    }

    #[test]
    fn test_history_is_bounded_and_deduplicated() {
        let mut settings = ViewSettings::default();
        for idx in 0..60 {
            settings.record_statement(&format!("SELECT {idx}"));
        }
        assert_eq!(settings.history.len(), HISTORY_LIMIT);
        assert_eq!(settings.history[0], "SELECT 10");

        settings.record_statement("  SELECT 10  ");
        assert_eq!(settings.history.len(), HISTORY_LIMIT);
        assert_eq!(settings.history.last().unwrap(), "SELECT 10");

        settings.record_statement("   ");
        assert_eq!(settings.history.len(), HISTORY_LIMIT);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_client_config(&temp_path("does_not_exist.json")).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.credential_namespace, "odbc-client");
        assert!(config.remember_credentials);
    }

    #[test]
    fn test_client_config_round_trip_through_file() {
        let path = temp_path("client_round_trip.json");
        let _ = fs::remove_file(&path);

        let config = ClientConfig {
            credential_namespace: "team".to_string(),
            remember_credentials: false,
            log_filter: Some("odbc_client=debug".to_string()),
        };
        save_client_config(&path, &config).unwrap();
        assert_eq!(load_client_config(&path).unwrap(), config);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_path("partial.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{ "remember_credentials": false }"#).unwrap();

        let config = load_client_config(&path).unwrap();
        assert_eq!(config.credential_namespace, "odbc-client");
        assert!(!config.remember_credentials);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let path = temp_path("invalid.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let err = load_json::<ViewSettings>(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");

        let _ = fs::remove_file(&path);
    }
}
