//! `SQLite` Connection Backend
//!
//! Implements [`Connector`] and [`Connection`] on top of `rusqlite`, reading
//! the same attributes the `SQLite3` ODBC driver understands.
//!
//! # Connection string
//! - `Database=<path>` (also `DBQ`, `Data Source`); `:memory:` for in-memory
//! - `ReadOnly=1` opens the file read-only
//! - `Timeout=<ms>` sets the busy timeout
//!
//! # Implementation Notes
//! - Catalog `main` holds the tables of the database file, `temp` the
//!   temporary ones; `SQLite` has no schemas and no procedures
//! - `sqlite_*` internal tables are reported as `SYSTEM TABLE`
//! - BLOB data is Base64-encoded for display

use std::path::Path;
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{OpenFlags, Row};
use tracing::debug;

use crate::connection_string::ConnectionString;
use crate::credentials::CredentialFields;
use crate::engine::{
    Connection, Connector, DiagnosticMessage, InfoKind, ProcedureRow, ResultSink, TableRow,
};
use crate::error::{ClientError, Result};

const DATABASE_KEYS: [&str; 3] = ["Database", "DBQ", "Data Source"];

/// Opens `SQLite` databases from connection strings
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn connect(
        &self,
        connection_string: &ConnectionString,
        _credentials: &CredentialFields,
    ) -> Result<Box<dyn Connection>> {
        let path = DATABASE_KEYS
            .iter()
            .find_map(|key| connection_string.get(key))
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .ok_or_else(|| {
                ClientError::invalid_input("SQLite requires a 'Database' property")
            })?;

        let read_only = connection_string.get("ReadOnly").is_some_and(is_truthy);
        let connection = SqliteConnection::open(path, read_only)?;

        if let Some(timeout) = connection_string.get("Timeout") {
            let ms: u64 = timeout.trim().parse().map_err(|_| {
                ClientError::invalid_input(format!("Timeout must be milliseconds, got '{timeout}'"))
            })?;
            connection.conn.busy_timeout(Duration::from_millis(ms)).map_err(|e| {
                ClientError::connection_failed(format!("Failed to set timeout: {e}"))
            })?;
        }

        Ok(Box::new(connection))
    }
}

/// An open `SQLite` database
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    database_name: String,
    read_only: bool,
}

impl SqliteConnection {
    /// Open a database file (created if missing unless `read_only`)
    pub fn open(path: &str, read_only: bool) -> Result<Self> {
        let flags = if read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        };

        let conn = rusqlite::Connection::open_with_flags(path, flags).map_err(|e| {
            ClientError::connection_failed(format!("Failed to open SQLite database: {e}"))
        })?;

        let database_name = Path::new(path)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(path)
            .to_string();

        debug!(database = %database_name, read_only, "Opened SQLite database");
        Ok(Self { conn, database_name, read_only })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(|e| {
            ClientError::connection_failed(format!("Failed to open SQLite database: {e}"))
        })?;
        Ok(Self { conn, database_name: ":memory:".to_string(), read_only: false })
    }

    /// The underlying `rusqlite` connection
    #[must_use]
    pub const fn raw(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn visit_tables(
        &self,
        catalog: &str,
        visit: &mut dyn FnMut(TableRow),
    ) -> std::result::Result<(), rusqlite::Error> {
        let master = if catalog == "temp" { "sqlite_temp_master" } else { "sqlite_master" };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT name, type FROM {master} WHERE type IN ('table', 'view') ORDER BY name"
        ))?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let kind: String = row.get(1)?;
            let table_type = match (kind.as_str(), catalog) {
                _ if name.starts_with("sqlite_") => "SYSTEM TABLE",
                ("view", _) => "VIEW",
                (_, "temp") => "LOCAL TEMPORARY",
                _ => "TABLE",
            };
            visit(TableRow {
                catalog: Some(catalog.to_string()),
                schema: None,
                name,
                table_type: table_type.to_string(),
                remarks: None,
            });
        }

        Ok(())
    }
}

impl Connection for SqliteConnection {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn info(&mut self, kind: InfoKind) -> Result<String> {
        Ok(match kind {
            InfoKind::DataSourceReadOnly => (if self.read_only { "Y" } else { "N" }).to_string(),
            InfoKind::DbmsName => "SQLite".to_string(),
            InfoKind::DbmsVersion => rusqlite::version().to_string(),
            InfoKind::DatabaseName => self.database_name.clone(),
        })
    }

    fn tables(&mut self, visit: &mut dyn FnMut(TableRow)) -> Result<()> {
        for catalog in ["main", "temp"] {
            self.visit_tables(catalog, visit).map_err(|e| {
                ClientError::enumeration_failed(format!("Failed to query {catalog} tables: {e}"))
            })?;
        }
        Ok(())
    }

    fn procedures(&mut self, _visit: &mut dyn FnMut(ProcedureRow)) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, sql: &str, sink: &mut dyn ResultSink) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| ClientError::statement_failed(e.to_string()))?;

        let columns: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();

        if columns.is_empty() {
            // DDL/DML: no result set
            let changed =
                stmt.execute([]).map_err(|e| ClientError::statement_failed(e.to_string()))?;
            if changed > 0 {
                sink.message(DiagnosticMessage::info(format!("{changed} row(s) affected")));
            }
            return Ok(());
        }

        let width = columns.len();
        sink.begin_result_set(columns);

        let mut rows = stmt.query([]).map_err(|e| ClientError::statement_failed(e.to_string()))?;
        while let Some(row) =
            rows.next().map_err(|e| ClientError::statement_failed(e.to_string()))?
        {
            let cells = (0..width)
                .map(|idx| display_value(row, idx))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ClientError::statement_failed(format!("Failed to fetch row: {e}")))?;
            if sink.row(cells).is_break() {
                break;
            }
        }

        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "yes" | "true" | "on")
}

/// Convert a `SQLite` value to its display string
fn display_value(row: &Row, idx: usize) -> std::result::Result<Option<String>, rusqlite::Error> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(s) => Some(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => {
            use base64::Engine;
            Some(base64::engine::general_purpose::STANDARD.encode(b))
        }
    })
}
