//! ODBC connection backend
//!
//! Catalog functions select everything (no patterns). Every cell is read as
//! text.

use std::ffi::c_void;

use odbc_api::handles::{AsStatementRef, Statement as _};
use odbc_api::sys::{HStmt, InfoType, SqlReturn};
use odbc_api::{
    Connection as OdbcApiConnection, ConnectionOptions, Cursor, CursorImpl, ResultSetMetadata as _,
};
use tracing::debug;

use super::rows::{affected_message, stream_procedures, stream_rows, stream_tables, TextRows};
use super::{environment, from_wide};
use crate::connection_string::ConnectionString;
use crate::credentials::CredentialFields;
use crate::engine::{Connection, Connector, InfoKind, ProcedureRow, ResultSink, TableRow};
use crate::error::{ClientError, Result};

// Catalog function not exported by odbc-sys
#[cfg_attr(windows, link(name = "odbc32"))]
#[cfg_attr(not(windows), link(name = "odbc"))]
extern "system" {
    fn SQLProceduresW(
        statement: HStmt,
        catalog: *const u16,
        catalog_len: i16,
        schema: *const u16,
        schema_len: i16,
        name: *const u16,
        name_len: i16,
    ) -> SqlReturn;
}

/// `SQLProcedures` result columns
const PROCEDURE_COLUMNS: u16 = 8;
/// `SQLTables` result columns
const TABLE_COLUMNS: u16 = 5;

/// Opens connections through `SQLDriverConnect`
#[derive(Debug, Clone, Copy, Default)]
pub struct OdbcConnector;

impl OdbcConnector {
    /// Connector on the process-wide environment
    pub fn new() -> Result<Self> {
        environment()?;
        Ok(Self)
    }
}

impl Connector for OdbcConnector {
    fn connect(
        &self,
        connection_string: &ConnectionString,
        credentials: &CredentialFields,
    ) -> Result<Box<dyn Connection>> {
        let full = connection_string.with_credentials(&credentials.username, &credentials.password);
        let conn = environment()?
            .connect_with_connection_string(&full, ConnectionOptions::default())
            .map_err(|e| ClientError::connection_failed(e.to_string()))?;

        debug!(dsn = ?connection_string.extract_dsn(), "ODBC connection opened");
        Ok(Box::new(OdbcConnection { conn }))
    }
}

/// An open ODBC connection
pub struct OdbcConnection {
    conn: OdbcApiConnection<'static>,
}

// SAFETY: the environment is process-wide and `Connection` requires `&mut`
// for every call, so the handle is used by one thread at a time. This is the
// contract of odbc-api's `Connection::promote_to_send`.
unsafe impl Send for OdbcConnection {}

impl std::fmt::Debug for OdbcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdbcConnection").finish_non_exhaustive()
    }
}

impl OdbcConnection {
    /// String-valued `SQLGetInfo` key odbc-api has no accessor for
    fn info_string(&self, info_type: InfoType, name: &str) -> Result<String> {
        let mut buffer = [0u16; 512];
        let mut byte_len: i16 = 0;

        // SAFETY: buffer outlives the call, its byte size is passed along
        let ret = unsafe {
            odbc_api::sys::SQLGetInfoW(
                self.conn.as_sys(),
                info_type,
                buffer.as_mut_ptr().cast::<c_void>(),
                std::mem::size_of_val(&buffer) as i16,
                &mut byte_len,
            )
        };
        if ret != SqlReturn::SUCCESS && ret != SqlReturn::SUCCESS_WITH_INFO {
            return Err(ClientError::connection_failed(format!(
                "SQLGetInfo({name}) returned {}",
                ret.0
            )));
        }
        Ok(from_wide(&buffer, usize::try_from(byte_len).unwrap_or(0) / 2))
    }
}

fn statement_error(e: &odbc_api::Error) -> ClientError {
    ClientError::statement_failed(e.to_string())
}

fn metadata_error(call: &str, e: &odbc_api::Error) -> ClientError {
    ClientError::enumeration_failed(format!("{call}: {e}"))
}

impl Connection for OdbcConnection {
    fn backend(&self) -> &'static str {
        "odbc"
    }

    fn info(&mut self, kind: InfoKind) -> Result<String> {
        let info_error = |e: odbc_api::Error| ClientError::connection_failed(e.to_string());
        match kind {
            InfoKind::DbmsName => self.conn.database_management_system_name().map_err(info_error),
            InfoKind::DatabaseName => self.conn.current_catalog().map_err(info_error),
            InfoKind::DbmsVersion => self.info_string(InfoType::DbmsVer, "SQL_DBMS_VER"),
            InfoKind::DataSourceReadOnly => {
                self.info_string(InfoType::DataSourceReadOnly, "SQL_DATA_SOURCE_READ_ONLY")
            }
        }
    }

    fn tables(&mut self, visit: &mut dyn FnMut(TableRow)) -> Result<()> {
        let cursor =
            self.conn.tables("", "", "", "").map_err(|e| metadata_error("SQLTables", &e))?;
        stream_tables(&mut TextRows::new(cursor, TABLE_COLUMNS), visit)
    }

    fn procedures(&mut self, visit: &mut dyn FnMut(ProcedureRow)) -> Result<()> {
        let mut stmt =
            self.conn.preallocate().map_err(|e| metadata_error("SQLAllocHandle", &e))?;
        let hstmt = stmt.as_stmt_ref().as_sys();

        // SAFETY: NULL pattern arguments select everything
        let ret = unsafe {
            SQLProceduresW(
                hstmt,
                std::ptr::null(),
                0,
                std::ptr::null(),
                0,
                std::ptr::null(),
                0,
            )
        };
        if ret != SqlReturn::SUCCESS && ret != SqlReturn::SUCCESS_WITH_INFO {
            return Err(ClientError::enumeration_failed(format!(
                "SQLProcedures returned {}",
                ret.0
            )));
        }

        // SAFETY: SQLProcedures succeeded, so the statement has an open result set
        let cursor = unsafe { CursorImpl::new(stmt.as_stmt_ref()) };
        stream_procedures(&mut TextRows::new(cursor, PROCEDURE_COLUMNS), visit)
    }

    fn execute(&mut self, sql: &str, sink: &mut dyn ResultSink) -> Result<()> {
        let mut stmt = self.conn.preallocate().map_err(|e| statement_error(&e))?;

        if let Some(cursor) = stmt.execute(sql, ()).map_err(|e| statement_error(&e))? {
            return stream_cursor(cursor, sink);
        }

        let row_count = stmt.row_count().map_err(|e| statement_error(&e))?;
        if let Some(message) = affected_message(row_count) {
            sink.message(message);
        }
        Ok(())
    }
}

fn stream_cursor(mut cursor: impl Cursor, sink: &mut dyn ResultSink) -> Result<()> {
    let columns = cursor
        .column_names()
        .map_err(|e| statement_error(&e))?
        .collect::<std::result::Result<Vec<String>, _>>()
        .map_err(|e| statement_error(&e))?;
    let width = u16::try_from(columns.len())
        .map_err(|_| ClientError::statement_failed("too many result columns"))?;
    sink.begin_result_set(columns);

    stream_rows(&mut TextRows::new(cursor, width), sink)
}
