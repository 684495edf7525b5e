//! End-to-end behavior against real SQLite databases
#![cfg(feature = "sqlite")]

use std::path::PathBuf;

use odbc_client::catalog::NodeKind;
use odbc_client::engine::sqlite::SqliteConnector;
use odbc_client::{
    CatalogTree, Connection, ConnectionString, ConnectionSummary, Connector, CredentialFields,
    QueryExecutor, Severity, ROW_LIMIT,
};
use pretty_assertions::assert_eq;

fn temp_db(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("odbc_client_sqlite_tests");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn connect(text: &str) -> Box<dyn Connection> {
    let parsed = ConnectionString::parse(text).unwrap();
    SqliteConnector.connect(&parsed, &CredentialFields::default()).unwrap()
}

fn memory() -> Box<dyn Connection> {
    connect("Driver={SQLite3};Database=:memory:")
}

#[test]
fn test_result_grid_is_capped() {
    let mut conn = memory();
    let mut executor = QueryExecutor::new(conn.as_mut());

    let outcome = executor.run_statement(
        "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 1500) \
         SELECT x, NULL AS missing FROM n",
    );

    let result = outcome.result.unwrap();
    assert_eq!(result.columns, vec!["x", "missing"]);
    assert_eq!(result.rows.len(), ROW_LIMIT);
    assert!(result.truncated);
    assert_eq!(result.rows[0], vec!["1", "NULL"]);
    assert_eq!(result.rows[ROW_LIMIT - 1][0], "1000");
    assert!(outcome.messages.is_empty());
}

#[test]
fn test_exact_limit_is_not_truncated() {
    let mut conn = memory();
    let outcome = QueryExecutor::new(conn.as_mut()).run_statement(
        "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 1000) \
         SELECT x FROM n",
    );

    assert_eq!(outcome.rows_returned(), ROW_LIMIT);
    assert!(!outcome.truncated());
}

#[test]
fn test_statements_without_result_set() {
    let mut conn = memory();
    let mut executor = QueryExecutor::new(conn.as_mut());

    let created = executor.run_statement("CREATE TABLE t (id INTEGER, data BLOB)");
    assert_eq!(created.result, None);
    assert!(created.messages.is_empty());

    let inserted =
        executor.run_statement("INSERT INTO t VALUES (1, x'DEADBEEF'), (2, NULL), (3, 'x')");
    assert_eq!(inserted.result, None);
    assert_eq!(inserted.messages.len(), 1);
    assert_eq!(inserted.messages[0].severity, Severity::Info);
    assert_eq!(inserted.messages[0].text, "3 row(s) affected");

    let selected = executor.run_statement("SELECT data FROM t WHERE id < 3 ORDER BY id");
    let rows = selected.result.unwrap().rows;
    assert_eq!(rows, vec![vec!["3q2+7w==".to_string()], vec!["NULL".to_string()]]);
}

#[test]
fn test_empty_result_set_keeps_columns() {
    let mut conn = memory();
    let outcome = QueryExecutor::new(conn.as_mut()).run_statement("SELECT 1 AS one WHERE 0");

    let result = outcome.result.unwrap();
    assert_eq!(result.columns, vec!["one"]);
    assert!(result.rows.is_empty());
    assert!(!result.truncated);
}

#[test]
fn test_errors_become_messages() {
    let mut conn = memory();
    let mut executor = QueryExecutor::new(conn.as_mut());

    let outcome = executor.run_statement("SELEC nonsense");
    assert!(outcome.failed());
    assert_eq!(outcome.result, None);
    assert!(outcome.messages[0].text.contains("syntax error"));

    let empty = executor.run_statement("   ");
    assert!(empty.failed());

    // The connection stays usable
    assert_eq!(executor.run_statement("SELECT 2").rows_returned(), 1);
}

#[test]
fn test_catalog_from_sqlite() {
    let path = temp_db("catalog.db");
    let mut conn = connect(&format!("Database={}", path.display()));
    {
        let mut executor = QueryExecutor::new(conn.as_mut());
        for sql in [
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, total REAL)",
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT)",
            "CREATE VIEW big_orders AS SELECT * FROM orders WHERE total > 100",
            "INSERT INTO orders (total) VALUES (10.5)",
            "CREATE TEMP TABLE scratch (x)",
        ] {
            assert!(!executor.run_statement(sql).failed(), "{sql}");
        }
    }

    let tree = CatalogTree::populate(conn.as_mut()).unwrap();

    let table_group = tree.find(&["Catalog", "main", "Table"]).unwrap();
    let names: Vec<&str> =
        tree.node(table_group).children.iter().map(|&id| tree.node(id).name.as_str()).collect();
    assert_eq!(names, vec!["customers", "orders"]);
    assert!(tree.node(table_group).expanded);

    assert!(tree.find(&["Catalog", "main", "View", "big_orders"]).is_some());
    assert!(tree.find(&["Catalog", "temp", "Local Temporary", "scratch"]).is_some());

    assert_eq!(tree.count(NodeKind::Procedure), 0);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_small_system_group_stops_expansion() {
    let mut conn = memory();
    {
        let mut executor = QueryExecutor::new(conn.as_mut());
        // AUTOINCREMENT creates the sqlite_sequence system table
        executor.run_statement("CREATE TABLE orders (id INTEGER PRIMARY KEY AUTOINCREMENT)");
        executor.run_statement("INSERT INTO orders DEFAULT VALUES");
    }

    let tree = CatalogTree::populate(conn.as_mut()).unwrap();

    let system = tree.find(&["Catalog", "main", "System Table"]).unwrap();
    assert!(!tree.node(system).expanded);
    let tables = tree.find(&["Catalog", "main", "Table"]).unwrap();
    assert!(!tree.node(tables).expanded);
    assert!(tree.node(tree.find(&["Catalog", "main"]).unwrap()).expanded);
}

#[test]
fn test_connection_summary() {
    let path = temp_db("summary.db");
    {
        let mut conn = connect(&format!("Database={}", path.display()));
        QueryExecutor::new(conn.as_mut()).run_statement("CREATE TABLE seed (x)");
    }

    let mut conn = connect(&format!("DBQ={};ReadOnly=yes", path.display()));
    let summary = ConnectionSummary::query(conn.as_mut()).unwrap();

    assert!(summary.read_only);
    assert_eq!(summary.dbms_name, "SQLite");
    assert_eq!(summary.database_name, "summary");

    let outcome = QueryExecutor::new(conn.as_mut()).run_statement("CREATE TABLE nope (x)");
    assert!(outcome.failed());

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_missing_database_property() {
    let parsed = ConnectionString::parse("Driver={SQLite3}").unwrap();
    let err = SqliteConnector.connect(&parsed, &CredentialFields::default()).err().unwrap();
    assert_eq!(err.error_code(), "INVALID_INPUT");
}
