//! odbc-client - ODBC Connection and Query Client Core
//!
//! The non-visual core of a database connect window and query view: it
//! parses and edits ODBC connection strings, registers and lists data
//! sources through the driver manager, remembers credentials in the OS
//! secret store, browses a connection's catalog and runs SQL statements
//! with a bounded result grid.
//!
//! # Core Principles
//! - A stored or displayed connection string never contains a password
//! - Driver-manager failures are warnings, not crashes
//! - Result grids are capped at [`ROW_LIMIT`] rows
//!
//! # Module Organization
//! - [`connection_string`] - Parsing, editing and redaction of connection strings
//! - [`registry`] - Data source registry over the driver manager
//! - [`credentials`] - Credential load/store policy and secret stores
//! - [`catalog`] - Catalog tree built from the catalog functions
//! - [`query`] - Statement execution into a bounded grid
//! - [`engine`] - Connection and connector traits, SQLite backend
//! - [`odbc`] - Driver-manager backend (feature `odbc`)
//! - [`dialog`] - Connect window state
//! - [`session`] - Connect, remove, configure and manage workflows
//! - [`config`] - Client config and per-connection view settings
//! - [`output`] - JSON output envelopes of the CLI
//! - [`error`] - Error types

pub mod catalog;
pub mod config;
pub mod connection_string;
pub mod credentials;
pub mod dialog;
pub mod engine;
pub mod error;
#[cfg(feature = "odbc")]
pub mod odbc;
pub mod output;
pub mod query;
pub mod registry;
pub mod session;

pub use catalog::{CatalogNode, CatalogTree, NodeId, NodeKind, TreeView};
pub use config::{ClientConfig, ViewSettings};
pub use connection_string::{ConnectionProperty, ConnectionString, DataSourceEntry};
pub use credentials::{
    Credential, CredentialFields, CredentialPolicy, LoadMode, MemorySecretStore, SecretStore,
    SelectionEffect,
};
pub use dialog::ConnectionDialog;
pub use engine::{
    Connection, ConnectionSummary, Connector, DiagnosticMessage, InfoKind, ProcedureRow,
    ResultSink, Severity, TableRow,
};
pub use error::{ClientError, Result};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use query::{QueryExecutor, QueryResult, StatementOutcome, ROW_LIMIT};
pub use registry::{
    DataSourceDescriptor, DriverManager, DsnRegistry, NoDriverManager, Scope, ScopeFilter,
    WindowHandle,
};
pub use session::{ConnectRequest, ConnectedView, Listing, RemovalReport, Session};
