//! Connect, save-as, remove and manage workflows against fake backends

mod common;

use std::sync::Arc;

use common::{FakeConnector, FakeDatabase, RecordingManager};
use odbc_client::registry::{ConfigAction, ConfigRequest};
use odbc_client::{
    ClientError, ConnectRequest, ConnectionDialog, CredentialFields, CredentialPolicy, DsnRegistry,
    MemorySecretStore, Scope, SecretStore, SelectionEffect, Session,
};
use pretty_assertions::assert_eq;

struct Harness {
    manager: RecordingManager,
    store: Arc<MemorySecretStore>,
    connector: FakeConnector,
    session: Session,
}

fn harness(manager: RecordingManager, db: FakeDatabase) -> Harness {
    let store = Arc::new(MemorySecretStore::new());
    let connector = FakeConnector::new(db);
    let session = Session::new(
        Arc::new(DsnRegistry::new(manager.clone())),
        store.clone(),
        Arc::new(CredentialPolicy::default()),
        Box::new(connector.clone()),
    );
    Harness { manager, store, connector, session }
}

fn request(connection_string: &str, save_as: &str, user: &str, password: &str) -> ConnectRequest {
    ConnectRequest {
        connection_string: connection_string.to_string(),
        data_source_name: save_as.to_string(),
        credentials: CredentialFields::new(user, password),
        remember_credentials: true,
    }
}

#[test]
fn test_save_as_registers_without_password() {
    let h = harness(RecordingManager::new(), FakeDatabase::default());

    let view = h
        .session
        .connect(&request("Driver={PostgreSQL};Server=db;PWD=old", "Sales", "bob", "secret"))
        .unwrap();

    let calls = h.manager.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].request, ConfigRequest::new(ConfigAction::Add, Scope::User));
    assert_eq!(calls[0].driver, "{PostgreSQL}");
    assert_eq!(calls[0].attribute_block, "DSN=Sales\0Server=db\0UID=bob\0\0");
    assert!(!calls[0].attribute_block.to_lowercase().contains("pwd"));
    assert!(!calls[0].attribute_block.contains("secret"));

    // The driver still receives the typed credentials
    let attempts = h.connector.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].1, CredentialFields::new("bob", "secret"));

    assert!(view.warnings.is_empty());
    assert!(!view.extra.to_lowercase().contains("pwd"));
}

#[test]
fn test_remember_stores_under_save_as_name() {
    let h = harness(RecordingManager::new(), FakeDatabase::default());

    h.session.connect(&request("Driver={SQLite3};Database=app.db", "Local", "ann", "pw")).unwrap();

    let stored = h.store.get("odbc-client:Local").unwrap().unwrap();
    assert_eq!(stored.username, "ann");
    assert_eq!(stored.password, "pw");
}

#[test]
fn test_no_remember_leaves_store_empty() {
    let h = harness(RecordingManager::new(), FakeDatabase::default());

    let mut req = request("Driver={SQLite3};Database=app.db", "Local", "ann", "pw");
    req.remember_credentials = false;
    h.session.connect(&req).unwrap();

    assert!(h.store.is_empty());
}

#[test]
fn test_rejected_registration_is_a_warning() {
    let manager = RecordingManager::new();
    manager.reject_all();
    let h = harness(manager, FakeDatabase::default());

    let view = h
        .session
        .connect(&request("Driver={PostgreSQL};Server=db", "Sales", "bob", "secret"))
        .unwrap();

    assert_eq!(view.warnings.len(), 1);
    assert!(view.warnings[0].contains("PostgreSQL"));
    assert_eq!(h.connector.attempts().len(), 1);
}

#[test]
fn test_save_as_without_driver_warns_and_connects() {
    let h = harness(RecordingManager::new(), FakeDatabase::default());

    let view = h.session.connect(&request("Server=db", "Sales", "", "")).unwrap();

    assert!(h.manager.calls().is_empty());
    assert_eq!(view.warnings.len(), 1);
}

#[test]
fn test_malformed_string_stops_before_any_side_effect() {
    let h = harness(RecordingManager::new(), FakeDatabase::default());

    let err = h.session.connect(&request("Driver=x;garbage", "Sales", "bob", "pw")).unwrap_err();

    assert_eq!(err.error_code(), "MALFORMED_PROPERTY");
    assert!(h.manager.calls().is_empty());
    assert!(h.connector.attempts().is_empty());
    assert!(h.store.is_empty());
}

#[test]
fn test_connection_failure_stores_nothing() {
    let store = Arc::new(MemorySecretStore::new());
    let connector = FakeConnector { refuse: true, ..FakeConnector::default() };
    let session = Session::new(
        Arc::new(DsnRegistry::new(RecordingManager::new())),
        store.clone(),
        Arc::new(CredentialPolicy::default()),
        Box::new(connector),
    );

    let err = session.connect(&request("DSN=Sales", "", "bob", "pw")).unwrap_err();

    assert!(matches!(err, ClientError::ConnectionFailed(_)));
    assert!(store.is_empty());
}

#[test]
fn test_view_title_and_label() {
    let db = FakeDatabase { read_only: true, ..FakeDatabase::default() };
    let h = harness(RecordingManager::new(), db);

    let view = h.session.connect(&request("DSN=Sales;Timeout=5;PWD=x", "", "", "")).unwrap();

    assert_eq!(view.label.as_deref(), Some("Sales, ..."));
    assert_eq!(view.title, "Sales, ... - Read Only - FakeDB 1.0");
    assert_eq!(view.extra, "Timeout=5");
    assert!(view.settings_basename().starts_with("Sales-"));
}

#[test]
fn test_remove_forgets_credentials_when_gone() {
    let manager = RecordingManager::new().with_data_source("Sales", "PostgreSQL", Scope::System);
    let h = harness(manager, FakeDatabase::default());
    let policy = h.session.policy().clone();
    policy
        .remember(h.store.as_ref(), "Sales", &CredentialFields::new("bob", "pw"))
        .unwrap();

    let report = h.session.remove_dsn("Sales").unwrap();

    assert_eq!(report.rejected, None);
    assert!(!report.still_listed);
    assert!(report.credentials_removed);
    assert!(h.store.is_empty());

    let calls = h.manager.calls();
    assert_eq!(calls[0].request.code(), 6);
    assert_eq!(calls[0].attribute_block, "DSN=Sales\0\0");
}

#[test]
fn test_remove_keeps_credentials_while_listed() {
    let manager = RecordingManager::new().with_data_source("Sales", "PostgreSQL", Scope::User);
    manager.keep_removed();
    let h = harness(manager, FakeDatabase::default());
    h.session
        .policy()
        .remember(h.store.as_ref(), "Sales", &CredentialFields::new("bob", "pw"))
        .unwrap();

    let calls_before = h.manager.list_calls();
    let report = h.session.remove_dsn("Sales").unwrap();

    assert!(report.still_listed);
    assert!(!report.credentials_removed);
    assert_eq!(h.store.len(), 1);
    // one lookup to resolve the scope, one refresh afterwards (two scopes each)
    assert_eq!(h.manager.list_calls() - calls_before, 4);
}

#[test]
fn test_remove_rejection_is_reported() {
    let manager = RecordingManager::new().with_data_source("Sales", "PostgreSQL", Scope::User);
    manager.reject_all();
    let h = harness(manager, FakeDatabase::default());

    let report = h.session.remove_dsn("Sales").unwrap();

    assert!(report.rejected.is_some());
    assert!(report.still_listed);
    assert_eq!(report.data_sources.len(), 1);
}

#[test]
fn test_remove_unknown_data_source_fails() {
    let h = harness(RecordingManager::new(), FakeDatabase::default());

    let err = h.session.remove_dsn("Nope").unwrap_err();
    assert_eq!(err.error_code(), "INVALID_INPUT");
}

#[test]
fn test_manage_refreshes_lists() {
    let manager = RecordingManager::new()
        .with_drivers(&["PostgreSQL", "SQLite3"])
        .with_data_source("Local", "SQLite3", Scope::User);
    let h = harness(manager, FakeDatabase::default());

    let listing = h.session.open_manager();

    assert_eq!(listing.warning, None);
    assert_eq!(listing.drivers, vec!["PostgreSQL", "SQLite3"]);
    assert_eq!(listing.data_source_names(), vec!["Local"]);
}

#[test]
fn test_dialog_drives_session() {
    let manager = RecordingManager::new()
        .with_drivers(&["PostgreSQL"])
        .with_data_source("Sales", "PostgreSQL", Scope::User);
    let h = harness(manager, FakeDatabase::default());
    h.session
        .policy()
        .remember(h.store.as_ref(), "Sales", &CredentialFields::new("bob", "pw"))
        .unwrap();

    let mut dialog = ConnectionDialog::new(h.session.policy().clone(), h.session.store().clone());
    let listing = h.session.refresh();
    assert!(dialog.refresh_lists(listing.drivers.clone(), listing.data_source_names()));

    dialog.set_connection_string("Timeout=5");
    assert_eq!(dialog.select_data_source("Sales").unwrap(), SelectionEffect::Loaded);
    assert_eq!(dialog.connection_string(), "DSN=Sales;Timeout=5");

    h.session.connect(&dialog.connect_request()).unwrap();

    let attempts = h.connector.attempts();
    assert_eq!(attempts[0].0, "DSN=Sales;Timeout=5");
    assert_eq!(attempts[0].1, CredentialFields::new("bob", "pw"));
}
