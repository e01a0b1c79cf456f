//! Integration tests for statements run on checked-out and dedicated sessions.

mod common;

use chrono::NaiveDate;
use common::{ScriptedDriver, config, done, manager, row_event, typed_row_event};
use std::sync::Arc;
use txpool::db::TransactionManager;
use txpool::error::DbError;
use txpool::models::{ExecInfo, Params, Value};

#[tokio::test]
async fn test_fetch_one_returns_first_row() {
    let driver = ScriptedDriver::new();
    driver.respond(
        "SELECT id FROM orders",
        vec![
            row_event(&[("id", Value::Int(1))]),
            row_event(&[("id", Value::Int(2))]),
            row_event(&[("id", Value::Int(3))]),
            done(3, None),
        ],
    );
    let manager = manager(&driver, 1);
    manager.init().await.unwrap();

    let mut session = manager.begin().await.unwrap();
    let row = session
        .fetch_one("SELECT id FROM orders", &Params::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get("id"), Some(&Value::Int(1)));
    session.commit().await.unwrap();
}

#[tokio::test]
async fn test_fetch_one_without_rows_is_none() {
    let driver = ScriptedDriver::new();
    driver.respond("SELECT id FROM orders WHERE 0", vec![done(0, None)]);
    let manager = manager(&driver, 1);
    manager.init().await.unwrap();

    let mut session = manager.begin().await.unwrap();
    let row = session
        .fetch_one("SELECT id FROM orders WHERE 0", &Params::new())
        .await
        .unwrap();
    assert!(row.is_none());
    session.commit().await.unwrap();
}

#[tokio::test]
async fn test_fetch_array_keeps_emission_order() {
    let driver = ScriptedDriver::new();
    driver.respond(
        "SELECT name FROM parts",
        vec![
            row_event(&[("name", Value::Text("washer".into()))]),
            row_event(&[("name", Value::Text("bolt".into()))]),
            row_event(&[("name", Value::Text("nut".into()))]),
            done(3, None),
        ],
    );
    let manager = manager(&driver, 1);
    manager.init().await.unwrap();

    let mut session = manager.begin().await.unwrap();
    let rows = session
        .fetch_array("SELECT name FROM parts", &Params::new())
        .await
        .unwrap();
    let names: Vec<_> = rows
        .iter()
        .map(|r| r.get("name").and_then(Value::as_str).unwrap())
        .collect();
    assert_eq!(names, vec!["washer", "bolt", "nut"]);
    session.commit().await.unwrap();
}

#[tokio::test]
async fn test_fetch_array_rejects_despite_rows() {
    let driver = ScriptedDriver::new();
    driver.respond(
        "SELECT * FROM big",
        vec![
            row_event(&[("id", Value::Int(1))]),
            Err(DbError::database("Query execution was interrupted", Some("70100".into()), "")),
            row_event(&[("id", Value::Int(2))]),
        ],
    );
    let manager = manager(&driver, 1);
    manager.init().await.unwrap();

    let mut session = manager.begin().await.unwrap();
    let err = session
        .fetch_array("SELECT * FROM big", &Params::new())
        .await
        .unwrap_err();
    assert_eq!(err.sql_state(), Some("70100"));
    session.rollback().await.unwrap();
}

#[tokio::test]
async fn test_command_reports_exec_info() {
    let driver = ScriptedDriver::new();
    driver.respond(
        "INSERT INTO orders (sku, qty) VALUES (?, ?)",
        vec![done(1, Some(41))],
    );
    let manager = manager(&driver, 1);
    manager.init().await.unwrap();

    let mut session = manager.begin().await.unwrap();
    let params = Params::new().bind("sku", "A-100").bind("qty", 2);
    let info = session
        .command("INSERT INTO orders (sku, qty) VALUES (:sku, :qty)", &params)
        .await
        .unwrap();
    assert_eq!(
        info,
        ExecInfo {
            rows_affected: 1,
            last_insert_id: Some(41)
        }
    );
    session.commit().await.unwrap();

    assert_eq!(
        driver.statements().last().map(String::as_str),
        Some("COMMIT")
    );
}

#[tokio::test]
async fn test_missing_parameter_sends_nothing() {
    let driver = ScriptedDriver::new();
    let manager = manager(&driver, 1);
    manager.init().await.unwrap();
    let before = driver.statements().len();

    let mut session = manager.begin().await.unwrap();
    let err = session
        .command("DELETE FROM orders WHERE id = :id", &Params::new().bind("sku", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
    assert_eq!(driver.statements().len(), before);
    session.rollback().await.unwrap();
}

#[tokio::test]
async fn test_rows_are_coerced_with_metadata() {
    let driver = ScriptedDriver::new();
    driver.respond(
        "SELECT a, b, c, d FROM t",
        vec![
            typed_row_event(
                &[
                    ("a", Value::Text("2021-01-01".into())),
                    ("b", Value::Text("2.5".into())),
                    ("c", Value::Text("42".into())),
                    ("d", Value::Text("7".into())),
                ],
                &[("a", "DATE"), ("b", "DOUBLE"), ("c", "INTEGER"), ("d", "CHAR(1)")],
            ),
            done(1, None),
        ],
    );
    let manager = TransactionManager::with_driver(
        config(1).with_metadata(true),
        Arc::new(driver.clone()),
    );
    manager.init().await.unwrap();

    let mut session = manager.begin().await.unwrap();
    let row = session
        .fetch_one("SELECT a, b, c, d FROM t", &Params::new())
        .await
        .unwrap()
        .unwrap();
    let midnight = NaiveDate::from_ymd_opt(2021, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert_eq!(row.get("a"), Some(&Value::Date(midnight)));
    assert_eq!(row.get("b"), Some(&Value::Float(2.5)));
    assert_eq!(row.get("c"), Some(&Value::Int(42)));
    assert_eq!(row.get("d"), Some(&Value::Text("7".into())));
    session.commit().await.unwrap();
}

#[tokio::test]
async fn test_rows_are_raw_without_metadata() {
    let driver = ScriptedDriver::new();
    driver.respond(
        "SELECT c FROM t",
        vec![typed_row_event(
            &[("c", Value::Text("42".into()))],
            &[("c", "INTEGER")],
        )],
    );
    let manager = manager(&driver, 1);
    manager.init().await.unwrap();

    let mut session = manager.begin().await.unwrap();
    let row = session
        .fetch_one("SELECT c FROM t", &Params::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get("c"), Some(&Value::Text("42".into())));
    session.commit().await.unwrap();
}

#[tokio::test]
async fn test_basic_session_runs_on_dedicated_connection() {
    let driver = ScriptedDriver::new();
    driver.respond(
        "SELECT VERSION() AS v",
        vec![row_event(&[("v", Value::Text("10.11.6-MariaDB".into()))]), done(1, None)],
    );
    let manager = manager(&driver, 2);
    manager.init().await.unwrap();

    let basic = manager.basic().unwrap();
    let row = basic
        .fetch_one("SELECT VERSION() AS v", &Params::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get("v").and_then(Value::as_str), Some("10.11.6-MariaDB"));

    let rows = basic
        .fetch_array("SELECT VERSION() AS v", &Params::new())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    let on_dedicated: Vec<_> = driver
        .log()
        .into_iter()
        .filter(|(conn, _)| *conn == 0)
        .map(|(_, sql)| sql)
        .collect();
    assert_eq!(on_dedicated, vec!["SELECT VERSION() AS v"; 2]);
    // The pool is untouched
    assert_eq!(manager.status().idle, 2);
}

#[tokio::test]
async fn test_basic_session_after_close() {
    let driver = ScriptedDriver::new();
    let manager = manager(&driver, 1);
    manager.init().await.unwrap();

    let basic = manager.basic().unwrap();
    manager.close().await.unwrap();

    let err = basic.command("SELECT 1", &Params::new()).await.unwrap_err();
    assert!(matches!(err, DbError::NotReady { .. }));
}

#[tokio::test]
async fn test_session_serializes_rows_to_json() {
    let driver = ScriptedDriver::new();
    driver.respond(
        "SELECT id, blob FROM files",
        vec![row_event(&[("id", Value::Int(3)), ("blob", Value::Bytes(vec![1, 2, 3]))])],
    );
    let manager = manager(&driver, 1);
    manager.init().await.unwrap();

    let mut session = manager.begin().await.unwrap();
    let rows = session
        .fetch_array("SELECT id, blob FROM files", &Params::new())
        .await
        .unwrap();
    session.commit().await.unwrap();

    let json = serde_json::to_string(&rows).unwrap();
    assert_eq!(json, r#"[{"id":3,"blob":"AQID"}]"#);
}
