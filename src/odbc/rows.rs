//! Cursor rows as display strings
//!
//! [`RowSource`] is the one seam between `odbc-api` cursors and the
//! push-based [`Connection`](crate::engine::Connection) API. Everything
//! after it (metadata mapping, row streaming, the row-count message) is
//! plain Rust.

use std::ops::ControlFlow;

use odbc_api::Cursor;

use crate::engine::{DiagnosticMessage, ProcedureRow, ResultSink, TableRow};
use crate::error::{ClientError, Result};

/// Sequential reader of text rows
pub trait RowSource {
    /// Number of columns per row
    fn width(&self) -> u16;

    /// Next row, `None` once the result set is exhausted
    fn next_row(&mut self) -> Result<Option<Vec<Option<String>>>>;
}

/// [`RowSource`] over an `odbc-api` cursor
///
/// Cells are read with `get_text`, which keeps calling `SQLGetData` until a
/// long value is complete.
pub struct TextRows<C> {
    cursor: C,
    width: u16,
    buffer: Vec<u8>,
}

impl<C: Cursor> TextRows<C> {
    pub fn new(cursor: C, width: u16) -> Self {
        Self { cursor, width, buffer: Vec::new() }
    }
}

impl<C: Cursor> RowSource for TextRows<C> {
    fn width(&self) -> u16 {
        self.width
    }

    fn next_row(&mut self) -> Result<Option<Vec<Option<String>>>> {
        let Some(mut row) = self.cursor.next_row().map_err(fetch_error)? else {
            return Ok(None);
        };

        let mut cells = Vec::with_capacity(usize::from(self.width));
        for column in 1..=self.width {
            self.buffer.clear();
            let present = row.get_text(column, &mut self.buffer).map_err(fetch_error)?;
            cells.push(present.then(|| String::from_utf8_lossy(&self.buffer).into_owned()));
        }
        Ok(Some(cells))
    }
}

fn fetch_error(e: odbc_api::Error) -> ClientError {
    ClientError::statement_failed(e.to_string())
}

fn cell(cells: &[Option<String>], column: usize) -> Option<String> {
    cells.get(column).cloned().flatten().filter(|value| !value.is_empty())
}

/// Push every row into `sink` until the source ends or the sink stops
///
/// A fetch error after some rows leaves those rows in the sink.
pub fn stream_rows(source: &mut dyn RowSource, sink: &mut dyn ResultSink) -> Result<()> {
    while let Some(cells) = source.next_row()? {
        if let ControlFlow::Break(()) = sink.row(cells) {
            break;
        }
    }
    Ok(())
}

/// Map an `SQLTables` result set (catalog, schema, name, type, remarks)
pub fn stream_tables(source: &mut dyn RowSource, visit: &mut dyn FnMut(TableRow)) -> Result<()> {
    while let Some(cells) = source.next_row()? {
        visit(TableRow {
            catalog: cell(&cells, 0),
            schema: cell(&cells, 1),
            name: cell(&cells, 2).unwrap_or_default(),
            table_type: cell(&cells, 3).unwrap_or_default(),
            remarks: cell(&cells, 4),
        });
    }
    Ok(())
}

/// Map an `SQLProcedures` result set; columns 4-6 are reserved
pub fn stream_procedures(
    source: &mut dyn RowSource,
    visit: &mut dyn FnMut(ProcedureRow),
) -> Result<()> {
    while let Some(cells) = source.next_row()? {
        visit(ProcedureRow {
            catalog: cell(&cells, 0),
            schema: cell(&cells, 1),
            name: cell(&cells, 2).unwrap_or_default(),
            remarks: cell(&cells, 6),
        });
    }
    Ok(())
}

/// Message for a statement without a result set
#[must_use]
pub fn affected_message(row_count: Option<usize>) -> Option<DiagnosticMessage> {
    row_count
        .filter(|&count| count > 0)
        .map(|count| DiagnosticMessage::info(format!("{count} row(s) affected")))
}
