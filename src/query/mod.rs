//! Query Execution and Result Materialization
//!
//! Runs a statement on an open connection and materializes the first result
//! set into a row-capped grid of display strings.
//!
//! # Result semantics
//! - `result = None`: the statement produced no result set (DDL, DML)
//! - `result = Some(..)` with no rows: an empty result set
//! - At most [`ROW_LIMIT`] rows are kept; `truncated` is set when another row
//!   was available
//! - NULL cells are shown as `NULL`
//!
//! # Errors
//! A failing statement does not raise: the driver's message is appended as an
//! `Error`-severity message. Nothing is retried or rolled back.

use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{Connection, DiagnosticMessage, ResultSink, Severity};
use crate::error::{ClientError, Result};

/// Maximum number of rows kept per result set
pub const ROW_LIMIT: usize = 1000;

/// Display string of a NULL cell
pub const NULL_DISPLAY: &str = "NULL";

/// Materialized result set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,

    /// Row data as display strings
    pub rows: Vec<Vec<String>>,

    /// More rows existed than were kept
    pub truncated: bool,
}

/// Messages and optional result of one statement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementOutcome {
    pub messages: Vec<DiagnosticMessage>,
    pub result: Option<QueryResult>,
}

impl StatementOutcome {
    /// Whether any `Error`-severity message was recorded
    #[must_use]
    pub fn failed(&self) -> bool {
        self.messages.iter().any(|m| m.severity == Severity::Error)
    }

    /// Number of rows kept
    #[must_use]
    pub fn rows_returned(&self) -> usize {
        self.result.as_ref().map_or(0, |r| r.rows.len())
    }

    /// Whether the result set was cut at the row limit
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.truncated)
    }
}

/// Executor settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Forward a script to the driver as a single statement
    pub script_passthrough: bool,

    /// Row cap per result set
    pub row_limit: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self { script_passthrough: true, row_limit: ROW_LIMIT }
    }
}

/// Runs statements on a borrowed connection
pub struct QueryExecutor<'c> {
    connection: &'c mut dyn Connection,
    options: ExecutorOptions,
}

impl<'c> QueryExecutor<'c> {
    pub fn new(connection: &'c mut dyn Connection) -> Self {
        Self { connection, options: ExecutorOptions::default() }
    }

    #[must_use]
    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Execute one statement and materialize its result
    pub fn run_statement(&mut self, sql: &str) -> StatementOutcome {
        let mut grid = GridSink::new(self.options.row_limit);

        if sql.trim().is_empty() {
            grid.messages.push(DiagnosticMessage::error(
                ClientError::invalid_input("statement is empty").message(),
            ));
            return grid.finish();
        }

        debug!(backend = self.connection.backend(), len = sql.len(), "Executing statement");
        if let Err(e) = self.connection.execute(sql, &mut grid) {
            grid.messages.push(DiagnosticMessage::error(e.message()));
        }

        let outcome = grid.finish();
        info!(
            rows = outcome.rows_returned(),
            truncated = outcome.truncated(),
            failed = outcome.failed(),
            "Statement finished"
        );
        outcome
    }

    /// Execute a script
    ///
    /// The text is not split into statements. With pass-through enabled it is
    /// sent to the driver once, as is; otherwise `ScriptExecutionUnsupported`.
    pub fn run_script(&mut self, text: &str) -> Result<StatementOutcome> {
        if !self.options.script_passthrough {
            return Err(ClientError::ScriptExecutionUnsupported);
        }
        Ok(self.run_statement(text))
    }
}

struct GridSink {
    limit: usize,
    messages: Vec<DiagnosticMessage>,
    result: Option<QueryResult>,
}

impl GridSink {
    const fn new(limit: usize) -> Self {
        Self { limit, messages: Vec::new(), result: None }
    }

    fn finish(self) -> StatementOutcome {
        StatementOutcome { messages: self.messages, result: self.result }
    }
}

impl ResultSink for GridSink {
    fn begin_result_set(&mut self, columns: Vec<String>) {
        if self.result.is_none() {
            self.result = Some(QueryResult { columns, rows: Vec::new(), truncated: false });
        }
    }

    fn row(&mut self, cells: Vec<Option<String>>) -> ControlFlow<()> {
        let Some(result) = self.result.as_mut() else {
            return ControlFlow::Break(());
        };
        if result.rows.len() >= self.limit {
            result.truncated = true;
            return ControlFlow::Break(());
        }
        result
            .rows
            .push(cells.into_iter().map(|c| c.unwrap_or_else(|| NULL_DISPLAY.to_string())).collect());
        ControlFlow::Continue(())
    }

    fn message(&mut self, message: DiagnosticMessage) {
        self.messages.push(message);
    }
}
