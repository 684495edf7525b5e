//! Database Connection Traits and Core Types
//!
//! This module defines the abstractions the client core needs from an open
//! database connection. Each backend (`SQLite`, ODBC) implements
//! [`Connector`] and [`Connection`].
//!
//! # Push-based results
//! Metadata rows and statement results are pushed into caller-provided sinks
//! instead of being returned as cursors. A connection is borrowed mutably for
//! the whole call, so only one statement is ever in flight per connection.
//!
//! # Display values
//! Backends convert every cell to its display string (`None` for SQL NULL).
//! BLOBs are Base64-encoded.

use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use crate::connection_string::ConnectionString;
use crate::credentials::CredentialFields;
use crate::error::Result;

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Connection metadata requested through `SQLGetInfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoKind {
    /// `"Y"` when the data source is read-only
    DataSourceReadOnly,
    DbmsName,
    DbmsVersion,
    DatabaseName,
}

/// One row of table metadata (`SQLTables`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub name: String,

    /// Object type as reported by the driver (`TABLE`, `VIEW`, `SYSTEM TABLE`, ...)
    pub table_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

/// One row of procedure metadata (`SQLProcedures`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureRow {
    pub catalog: Option<String>,
    pub schema: Option<String>,

    /// Procedure name; some drivers append `()` or `;<n>`
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

/// Message severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A driver or client message attached to a statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticMessage {
    pub severity: Severity,

    /// Five-character SQLSTATE, when the driver reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlstate: Option<String>,

    pub text: String,
}

impl DiagnosticMessage {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self { severity, sqlstate: None, text: text.into() }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Severity::Info, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Severity::Error, text)
    }

    #[must_use]
    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }
}

impl std::fmt::Display for DiagnosticMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sqlstate {
            Some(state) => write!(f, "[{state}] {}", self.text),
            None => write!(f, "{}", self.text),
        }
    }
}

/// Receiver for statement output
pub trait ResultSink {
    /// A result set starts; called at most once per statement
    fn begin_result_set(&mut self, columns: Vec<String>);

    /// One row of display values; `Break` stops fetching
    fn row(&mut self, cells: Vec<Option<String>>) -> ControlFlow<()>;

    /// An informational message or warning reported while executing
    fn message(&mut self, message: DiagnosticMessage);
}

/// An open database connection
pub trait Connection: Send {
    /// Backend name (`sqlite`, `odbc`)
    fn backend(&self) -> &'static str;

    /// Connection metadata as a string
    fn info(&mut self, kind: InfoKind) -> Result<String>;

    /// Stream table metadata for all catalogs and schemas
    fn tables(&mut self, visit: &mut dyn FnMut(TableRow)) -> Result<()>;

    /// Stream procedure metadata for all catalogs and schemas
    fn procedures(&mut self, visit: &mut dyn FnMut(ProcedureRow)) -> Result<()>;

    /// Execute one statement
    ///
    /// Fails with `StatementFailed` carrying the driver's message. Rows and
    /// messages pushed into `sink` before the failure are kept.
    fn execute(&mut self, sql: &str, sink: &mut dyn ResultSink) -> Result<()>;
}

/// Opens connections
pub trait Connector: Send + Sync {
    /// Connect with a parsed connection string and the typed credentials
    ///
    /// Credentials are merged into the string handed to the driver only.
    fn connect(
        &self,
        connection_string: &ConnectionString,
        credentials: &CredentialFields,
    ) -> Result<Box<dyn Connection>>;
}

/// Read-only flag and product information of an open connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub read_only: bool,
    pub dbms_name: String,
    pub dbms_version: String,
    pub database_name: String,
}

impl ConnectionSummary {
    /// Query all summary fields
    pub fn query(connection: &mut dyn Connection) -> Result<Self> {
        let read_only = connection.info(InfoKind::DataSourceReadOnly)?;
        Ok(Self {
            read_only: read_only.trim().eq_ignore_ascii_case("y"),
            dbms_name: connection.info(InfoKind::DbmsName)?,
            dbms_version: connection.info(InfoKind::DbmsVersion)?,
            database_name: connection.info(InfoKind::DatabaseName)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct InfoOnly;

    impl Connection for InfoOnly {
        fn backend(&self) -> &'static str {
            "test"
        }

        fn info(&mut self, kind: InfoKind) -> Result<String> {
            Ok(match kind {
                InfoKind::DataSourceReadOnly => "Y".to_string(),
                InfoKind::DbmsName => "PostgreSQL".to_string(),
                InfoKind::DbmsVersion => "16.2".to_string(),
                InfoKind::DatabaseName => "app".to_string(),
            })
        }

        fn tables(&mut self, _visit: &mut dyn FnMut(TableRow)) -> Result<()> {
            Ok(())
        }

        fn procedures(&mut self, _visit: &mut dyn FnMut(ProcedureRow)) -> Result<()> {
            Ok(())
        }

        fn execute(&mut self, _sql: &str, _sink: &mut dyn ResultSink) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_summary_query() {
        let summary = ConnectionSummary::query(&mut InfoOnly).unwrap();
        assert!(summary.read_only);
        assert_eq!(summary.dbms_name, "PostgreSQL");
        assert_eq!(summary.dbms_version, "16.2");
        assert_eq!(summary.database_name, "app");
    }

    #[test]
    fn test_diagnostic_display() {
        let msg = DiagnosticMessage::error("syntax error").with_sqlstate("42000");
        assert_eq!(msg.to_string(), "[42000] syntax error");
        assert_eq!(DiagnosticMessage::info("3 row(s) affected").to_string(), "3 row(s) affected");
    }

    #[test]
    fn test_severity_serialization() {
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }
}
