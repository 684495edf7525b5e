//! Connection String Engine
//!
//! Parsing, editing, redaction and serialization of driver-manager connection
//! strings (`key=value;key=value`).
//!
//! # Rules
//! - Properties are separated by `;`, key and value by the first `=`
//! - Empty segments (`;;`) are skipped
//! - Leading whitespace of keys and values is trimmed, trailing content is kept
//! - Key comparison is case-insensitive, property order is preserved
//! - No escaping is performed (braced values containing `;` are not supported,
//!   matching the historical driver-manager behavior)
//!
//! # Credentials
//! A connection string that is stored or displayed never contains `PWD` or
//! `PASSWORD`. Passwords only appear in the string handed to the connect call
//! ([`ConnectionString::with_credentials`]) and in the secret store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Keys that carry a password and must never be persisted or displayed
pub const CREDENTIAL_KEYS: [&str; 2] = ["pwd", "password"];

/// Key selecting a registered data source
pub const DSN_KEY: &str = "DSN";

/// Key selecting a driver directly
pub const DRIVER_KEY: &str = "Driver";

/// Key carrying the user name
pub const UID_KEY: &str = "UID";

/// Key carrying the password (connect call only)
pub const PWD_KEY: &str = "PWD";

/// A single `key=value` (or value-less `key`) property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperty {
    /// Property key, leading whitespace trimmed
    pub key: String,

    /// Property value; `None` for a key written without `=`
    pub value: Option<String>,
}

impl ConnectionProperty {
    /// Create a `key=value` property
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: Some(value.into()) }
    }

    /// Create a value-less property (serialized as `key`)
    pub fn flag(key: impl Into<String>) -> Self {
        Self { key: key.into(), value: None }
    }

    /// Case-insensitive key comparison
    #[must_use]
    pub fn key_is(&self, name: &str) -> bool {
        eq_fold(self.key.trim_end(), name)
    }

    /// Whether this property carries a password
    #[must_use]
    pub fn is_credential(&self) -> bool {
        CREDENTIAL_KEYS.iter().any(|key| self.key_is(key))
    }

    /// Whether this property selects a driver or a data source
    #[must_use]
    pub fn is_selector(&self) -> bool {
        self.key_is(DSN_KEY) || self.key_is(DRIVER_KEY)
    }

    fn parse_segment(segment: &str) -> Option<Self> {
        let (key, value) = segment.split_once('=')?;
        Some(Self::new(key.trim_start(), value.trim_start()))
    }
}

impl fmt::Display for ConnectionProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.key, value),
            None => write!(f, "{}", self.key),
        }
    }
}

/// Ordered list of connection properties
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionString {
    properties: Vec<ConnectionProperty>,
}

/// Driver and attribute string ready for data source registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceEntry {
    /// Driver the data source is registered for
    pub driver: String,

    /// `DSN=<name>;...` attributes, credentials excluded, no trailing separator
    pub attributes: String,
}

impl ConnectionString {
    /// Parse a connection string
    ///
    /// Fails with `MalformedProperty` if a non-empty segment has no `=`.
    /// Nothing is returned on failure, so callers never see a partially
    /// parsed string.
    pub fn parse(text: &str) -> Result<Self> {
        let mut properties = Vec::new();

        for segment in split_segments(text) {
            let property = ConnectionProperty::parse_segment(segment).ok_or_else(|| {
                ClientError::malformed_property(format!(
                    "'{}' has no '=' separator",
                    segment.trim()
                ))
            })?;
            properties.push(property);
        }

        Ok(Self { properties })
    }

    /// Tokenize a connection string for editing
    ///
    /// Segments without `=` are kept as value-less properties so that edits
    /// never merge them into a neighbour or drop them.
    #[must_use]
    pub fn parse_lenient(text: &str) -> Self {
        let properties = split_segments(text)
            .map(|segment| {
                ConnectionProperty::parse_segment(segment)
                    .unwrap_or_else(|| ConnectionProperty::flag(segment.trim_start()))
            })
            .collect();

        Self { properties }
    }

    /// Build a connection string from properties
    #[must_use]
    pub fn from_properties(properties: Vec<ConnectionProperty>) -> Self {
        Self { properties }
    }

    /// All properties in order
    #[must_use]
    pub fn properties(&self) -> &[ConnectionProperty] {
        &self.properties
    }

    /// Number of properties
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the string has no properties
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Value of the first property with the given key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.iter().find(|p| p.key_is(key)).and_then(|p| p.value.as_deref())
    }

    /// Value of the first `DSN` property
    #[must_use]
    pub fn extract_dsn(&self) -> Option<&str> {
        self.get(DSN_KEY)
    }

    /// Value of the first `Driver` property
    #[must_use]
    pub fn driver(&self) -> Option<&str> {
        self.get(DRIVER_KEY)
    }

    /// Whether any password property is present
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.properties.iter().any(ConnectionProperty::is_credential)
    }

    /// Set a property, replacing the first existing one in place
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.properties.iter_mut().find(|p| p.key_is(key)) {
            Some(existing) => existing.value = Some(value),
            None => self.properties.push(ConnectionProperty::new(key, value)),
        }
    }

    /// Insert a property at the front
    pub fn prepend(&mut self, property: ConnectionProperty) {
        self.properties.insert(0, property);
    }

    /// Remove every property with the given key
    pub fn remove(&mut self, key: &str) {
        self.properties.retain(|p| !p.key_is(key));
    }

    /// Copy of this string without `PWD`/`PASSWORD` properties
    #[must_use]
    pub fn without_credentials(&self) -> Self {
        let properties =
            self.properties.iter().filter(|p| !p.is_credential()).cloned().collect();
        Self { properties }
    }

    /// Split into the DSN and a redacted string of the other properties
    ///
    /// The second element never contains a `PWD` or `PASSWORD` property.
    #[must_use]
    pub fn split_for_display(&self) -> (Option<String>, String) {
        let dsn = self.extract_dsn().map(str::to_string);
        let rest: Vec<String> = self
            .properties
            .iter()
            .filter(|p| !p.key_is(DSN_KEY) && !p.is_credential())
            .map(ToString::to_string)
            .collect();

        (dsn, rest.join(";"))
    }

    /// Build the driver and attribute string for registering `dsn_name`
    ///
    /// Existing `Driver`/`DSN` and password properties are dropped, `UID` is
    /// set when `username` is non-empty and `DSN=<dsn_name>` is hoisted to the
    /// front. The password is never part of the attributes.
    pub fn merge_for_persistence(&self, dsn_name: &str, username: &str) -> Result<DataSourceEntry> {
        let driver = self
            .driver()
            .map(str::trim_end)
            .filter(|driver| !driver.is_empty())
            .ok_or(ClientError::MissingDriver)?
            .to_string();

        let mut merged = Self {
            properties: self
                .properties
                .iter()
                .filter(|p| !p.is_selector() && !p.is_credential())
                .cloned()
                .collect(),
        };

        if !username.is_empty() {
            merged.set(UID_KEY, username);
        }
        merged.prepend(ConnectionProperty::new(DSN_KEY, dsn_name));

        Ok(DataSourceEntry { driver, attributes: merged.to_string() })
    }

    /// The string handed to the connect call
    ///
    /// Adds `UID`/`PWD` for non-empty credentials. The result contains the
    /// password and must not be stored, logged or displayed.
    #[must_use]
    pub fn with_credentials(&self, username: &str, password: &str) -> String {
        let mut full = self.clone();
        if !username.is_empty() {
            full.set(UID_KEY, username);
        }
        if !password.is_empty() {
            full.remove("password");
            full.set(PWD_KEY, password);
        }
        full.to_string()
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, property) in self.properties.iter().enumerate() {
            if idx > 0 {
                f.write_str(";")?;
            }
            write!(f, "{property}")?;
        }
        Ok(())
    }
}

impl FromStr for ConnectionString {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Replace the `Driver`/`DSN` selector of `text` with `key=value`
///
/// Every existing `Driver` and `DSN` property is removed (they are mutually
/// exclusive) and the new pair is put first. Idempotent.
#[must_use]
pub fn replace_key(text: &str, key: &str, value: &str) -> String {
    let mut edited = ConnectionString::parse_lenient(text);
    edited.properties.retain(|p| !p.is_selector());
    edited.prepend(ConnectionProperty::new(key, value));
    edited.to_string()
}

/// Remove the property whose key and value both match case-insensitively
///
/// No-op when absent. Idempotent.
#[must_use]
pub fn remove_key_value(text: &str, key: &str, value: &str) -> String {
    let mut edited = ConnectionString::parse_lenient(text);
    edited.properties.retain(|p| {
        let matches = p.key_is(key) && p.value.as_deref().is_some_and(|v| eq_fold(v, value));
        !matches
    });
    edited.to_string()
}

/// Label for a connection view: the DSN, with `, ...` when extra properties exist
#[must_use]
pub fn display_label(dsn: Option<&str>, extra: &str) -> Option<String> {
    let dsn = dsn.filter(|d| !d.is_empty())?;
    if extra.is_empty() {
        Some(dsn.to_string())
    } else {
        Some(format!("{dsn}, ..."))
    }
}

fn split_segments(text: &str) -> impl Iterator<Item = &str> {
    text.split(';').filter(|segment| !segment.trim().is_empty())
}

fn eq_fold(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}
