//! Shared fakes for integration tests
#![allow(dead_code)]

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};

use odbc_client::engine::{
    Connection, Connector, DiagnosticMessage, InfoKind, ProcedureRow, ResultSink, TableRow,
};
use odbc_client::registry::{ConfigAction, ConfigRequest};
use odbc_client::{
    ClientError, ConnectionString, CredentialFields, DataSourceDescriptor, DriverManager, Result,
    Scope, WindowHandle,
};

/// One `SQLConfigDataSource` call as seen by the fake driver manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCall {
    pub request: ConfigRequest,
    pub driver: String,
    pub attribute_block: String,
}

#[derive(Debug, Default)]
struct ManagerState {
    calls: Vec<ConfigCall>,
    data_sources: Vec<DataSourceDescriptor>,
    drivers: Vec<String>,
    reject: bool,
    keep_removed: bool,
    list_calls: usize,
}

/// In-memory driver manager that applies add/remove requests to its listing
#[derive(Debug, Clone, Default)]
pub struct RecordingManager {
    state: Arc<Mutex<ManagerState>>,
}

impl RecordingManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drivers(self, drivers: &[&str]) -> Self {
        self.state.lock().unwrap().drivers = drivers.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_data_source(self, name: &str, driver: &str, scope: Scope) -> Self {
        self.state.lock().unwrap().data_sources.push(DataSourceDescriptor {
            name: name.to_string(),
            driver: driver.to_string(),
            scope,
        });
        self
    }

    /// Every installer request fails from now on
    pub fn reject_all(&self) {
        self.state.lock().unwrap().reject = true;
    }

    /// Removal succeeds but the data source stays listed
    pub fn keep_removed(&self) {
        self.state.lock().unwrap().keep_removed = true;
    }

    pub fn calls(&self) -> Vec<ConfigCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }
}

fn attribute(block: &str, key: &str) -> Option<String> {
    block
        .split('\0')
        .filter_map(|attr| attr.split_once('='))
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.to_string())
}

impl DriverManager for RecordingManager {
    fn config_data_source(
        &self,
        _window: WindowHandle,
        request: ConfigRequest,
        driver: &str,
        attribute_block: &str,
    ) -> bool {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ConfigCall {
            request,
            driver: driver.to_string(),
            attribute_block: attribute_block.to_string(),
        });
        if state.reject {
            return false;
        }

        let Some(name) = attribute(attribute_block, "DSN") else {
            return false;
        };
        match request.action {
            ConfigAction::Add => state.data_sources.push(DataSourceDescriptor {
                name,
                driver: driver.to_string(),
                scope: request.scope,
            }),
            ConfigAction::Remove if !state.keep_removed => {
                state.data_sources.retain(|d| !(d.name == name && d.scope == request.scope));
            }
            _ => {}
        }
        true
    }

    fn manage_data_sources(&self, _window: WindowHandle) -> bool {
        !self.state.lock().unwrap().reject
    }

    fn data_sources(&self, scope: Scope) -> Result<Vec<DataSourceDescriptor>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        Ok(state.data_sources.iter().filter(|d| d.scope == scope).cloned().collect())
    }

    fn drivers(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().drivers.clone())
    }
}

/// Canned catalog and query behavior
#[derive(Debug, Clone, Default)]
pub struct FakeDatabase {
    pub tables: Vec<TableRow>,
    pub procedures: Vec<ProcedureRow>,
    pub read_only: bool,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub fail_procedures: bool,
}

impl FakeDatabase {
    pub fn table(mut self, catalog: &str, schema: &str, table_type: &str, name: &str) -> Self {
        self.tables.push(TableRow {
            catalog: Some(catalog.to_string()).filter(|c| !c.is_empty()),
            schema: Some(schema.to_string()).filter(|s| !s.is_empty()),
            name: name.to_string(),
            table_type: table_type.to_string(),
            remarks: None,
        });
        self
    }
}

pub struct FakeConnection {
    db: FakeDatabase,
}

impl FakeConnection {
    pub fn new(db: FakeDatabase) -> Self {
        Self { db }
    }
}

impl Connection for FakeConnection {
    fn backend(&self) -> &'static str {
        "fake"
    }

    fn info(&mut self, kind: InfoKind) -> Result<String> {
        Ok(match kind {
            InfoKind::DataSourceReadOnly => if self.db.read_only { "Y" } else { "N" }.to_string(),
            InfoKind::DbmsName => "FakeDB".to_string(),
            InfoKind::DbmsVersion => "1.0".to_string(),
            InfoKind::DatabaseName => "main".to_string(),
        })
    }

    fn tables(&mut self, visit: &mut dyn FnMut(TableRow)) -> Result<()> {
        self.db.tables.iter().cloned().for_each(visit);
        Ok(())
    }

    fn procedures(&mut self, visit: &mut dyn FnMut(ProcedureRow)) -> Result<()> {
        if self.db.fail_procedures {
            return Err(ClientError::enumeration_failed("procedures not supported"));
        }
        self.db.procedures.iter().cloned().for_each(visit);
        Ok(())
    }

    fn execute(&mut self, sql: &str, sink: &mut dyn ResultSink) -> Result<()> {
        if sql.contains("boom") {
            return Err(ClientError::statement_failed("syntax error near 'boom'"));
        }
        if self.db.columns.is_empty() {
            sink.message(DiagnosticMessage::info("3 row(s) affected"));
            return Ok(());
        }
        sink.begin_result_set(self.db.columns.clone());
        for row in &self.db.rows {
            if let ControlFlow::Break(()) = sink.row(row.clone()) {
                break;
            }
        }
        Ok(())
    }
}

/// Records every connect attempt
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    pub db: FakeDatabase,
    pub attempts: Arc<Mutex<Vec<(String, CredentialFields)>>>,
    pub refuse: bool,
}

impl FakeConnector {
    pub fn new(db: FakeDatabase) -> Self {
        Self { db, ..Self::default() }
    }

    pub fn attempts(&self) -> Vec<(String, CredentialFields)> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Connector for FakeConnector {
    fn connect(
        &self,
        connection_string: &ConnectionString,
        credentials: &CredentialFields,
    ) -> Result<Box<dyn Connection>> {
        self.attempts
            .lock()
            .unwrap()
            .push((connection_string.to_string(), credentials.clone()));
        if self.refuse {
            return Err(ClientError::connection_failed("login failed"));
        }
        Ok(Box::new(FakeConnection::new(self.db.clone())))
    }
}
