// crates/rowpost-client/tests/live_postgres.rs
// ============================================================================
// Module: Live Postgres Tests
// Description: End-to-end behavior against a real server.
// Purpose: Validate pagination, constraints, transactions, and concurrency.
// ============================================================================

//! Tests that require a reachable Postgres server. They are gated on the
//! `ROWPOST_TEST_DSN` environment variable (a connection string with
//! permission to create and drop tables) and pass silently when it is
//! unset, in which case nothing is exercised.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::thread;

use serde_json::json;

use rowpost_client::Database;
use rowpost_client::ParamMap;
use rowpost_client::PgPool;
use rowpost_client::PoolConfig;
use rowpost_core::codes;

/// Builds a pool from the test DSN, or `None` to skip the test.
fn live_pool(max_connections: u32) -> Option<PgPool> {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
    let connection = std::env::var("ROWPOST_TEST_DSN").ok()?;
    Some(PgPool::connect(&PoolConfig {
        connection,
        min_connections: 0,
        max_connections,
        connect_timeout_ms: 5_000,
        acquire_timeout_ms: 5_000,
        statement_timeout_ms: 30_000,
    }))
}

/// Builds a table name unique to this test process.
fn table_name(suffix: &str) -> String {
    format!("rowpost_{suffix}_{}", std::process::id())
}

/// Runs a statement that is expected to succeed.
fn must_execute(db: &mut Database, query: &str) {
    let envelope = db.execute(query, &ParamMap::new());
    assert!(envelope.is_success(), "statement failed: {query}: {:?}", envelope.message());
}

#[test]
fn paginated_query_returns_page_and_total() {
    let Some(pool) = live_pool(4) else { return };
    let table = table_name("page");
    let mut db = Database::new(pool);
    must_execute(&mut db, &format!("DROP TABLE IF EXISTS {table}"));
    must_execute(&mut db, &format!("CREATE TABLE {table} (id INT PRIMARY KEY)"));
    let rows: Vec<Vec<serde_json::Value>> = (1 ..= 25).map(|id| vec![json!(id)]).collect();
    let inserted = db.execute_many(&format!("INSERT INTO {table} (id) VALUES :rows"), &rows);
    assert!(inserted.is_success());

    let mut params = ParamMap::new();
    params.insert("offset".to_string(), json!(0));
    let page = db.execute_paginated(&format!("SELECT id FROM {table} ORDER BY id"), &params, 10);
    assert!(page.is_success(), "page query failed: {:?}", page.message());
    assert_eq!(page.rows().len(), 10);
    assert_eq!(page.total_count(), Ok(25));
    assert_eq!(page.rows().first().and_then(|row| row.get("id")), Some(&json!(1)));

    let mut params = ParamMap::new();
    params.insert("offset".to_string(), json!(20));
    let tail = db.execute_paginated(&format!("SELECT id FROM {table} ORDER BY id"), &params, 10);
    assert_eq!(tail.rows().len(), 5);
    assert_eq!(tail.total_count(), Ok(25));

    must_execute(&mut db, &format!("DROP TABLE {table}"));
}

#[test]
fn unique_violation_sets_predicate_and_diagnostics() {
    let Some(pool) = live_pool(4) else { return };
    let table = table_name("uniq");
    let mut db = Database::new(pool.clone());
    must_execute(&mut db, &format!("DROP TABLE IF EXISTS {table}"));
    must_execute(&mut db, &format!("CREATE TABLE {table} (email TEXT UNIQUE)"));

    let mut params = ParamMap::new();
    params.insert("email".to_string(), json!("a@b.c"));
    let insert = format!("INSERT INTO {table} (email) VALUES (:email)");
    assert!(db.execute(&insert, &params).is_success());

    let idle_before = pool.state().idle_connections;
    let duplicate = db.execute(&insert, &params);
    assert!(duplicate.is_error());
    assert!(duplicate.unique_violation());
    assert!(duplicate.rows().is_empty());
    let diagnostics = duplicate.diagnostics().expect("server diagnostics");
    assert!(diagnostics.constraint_name.as_deref().is_some_and(|name| name.contains(&table)));
    assert_eq!(pool.state().idle_connections, idle_before);

    must_execute(&mut db, &format!("DROP TABLE {table}"));
}

#[test]
fn preserved_transaction_commit_makes_writes_visible() {
    let Some(pool) = live_pool(4) else { return };
    let table = table_name("commit");
    let mut db = Database::new(pool.clone());
    must_execute(&mut db, &format!("DROP TABLE IF EXISTS {table}"));
    must_execute(&mut db, &format!("CREATE TABLE {table} (id INT)"));

    let mut params = ParamMap::new();
    params.insert("id".to_string(), json!(1));
    let first = db.execute_preserved(&format!("INSERT INTO {table} (id) VALUES (:id)"), &params);
    assert!(first.is_success());
    assert!(db.has_preserved());
    params.insert("id".to_string(), json!(2));
    let second =
        db.execute_preserved(&format!("INSERT INTO {table} (id) VALUES (:id)"), &params);
    assert!(second.is_success());
    let committed = db.commit().expect("preserved transaction open");
    assert!(committed.is_success());
    assert!(!db.has_preserved());

    let count = db.execute(&format!("SELECT COUNT(*) AS n FROM {table}"), &ParamMap::new());
    assert_eq!(count.first_row().expect("success").and_then(|row| row.get("n")), Some(&json!(2)));

    must_execute(&mut db, &format!("DROP TABLE {table}"));
}

#[test]
fn preserved_transaction_rollback_discards_writes() {
    let Some(pool) = live_pool(4) else { return };
    let table = table_name("rollback");
    let mut db = Database::new(pool.clone());
    must_execute(&mut db, &format!("DROP TABLE IF EXISTS {table}"));
    must_execute(&mut db, &format!("CREATE TABLE {table} (id INT)"));

    let rows = vec![vec![json!(1)], vec![json!(2)], vec![json!(3)]];
    let staged =
        db.execute_many_preserved(&format!("INSERT INTO {table} (id) VALUES :rows"), &rows);
    assert!(staged.is_success());
    db.rollback();
    assert!(!db.has_preserved());

    let count = db.execute(&format!("SELECT COUNT(*) AS n FROM {table}"), &ParamMap::new());
    assert_eq!(count.first_row().expect("success").and_then(|row| row.get("n")), Some(&json!(0)));

    must_execute(&mut db, &format!("DROP TABLE {table}"));
}

#[test]
fn bulk_insert_returns_requested_rows() {
    let Some(pool) = live_pool(4) else { return };
    let table = table_name("bulk");
    let mut db = Database::new(pool);
    must_execute(&mut db, &format!("DROP TABLE IF EXISTS {table}"));
    must_execute(
        &mut db,
        &format!("CREATE TABLE {table} (id INT, label TEXT, flag BOOLEAN, extra JSONB)"),
    );

    let rows = vec![
        vec![json!(1), json!("one"), json!(true), json!({"k": 1})],
        vec![json!(2), json!("two"), json!(false), json!(null)],
    ];
    let inserted = db.execute_many(
        &format!("INSERT INTO {table} (id, label, flag, extra) VALUES :rows RETURNING id"),
        &rows,
    );
    assert!(inserted.is_success(), "bulk insert failed: {:?}", inserted.message());
    assert_eq!(inserted.rows().len(), 2);

    let back = db.execute(
        &format!("SELECT id, label, flag, extra FROM {table} ORDER BY id"),
        &ParamMap::new(),
    );
    let first = back.first_row().expect("success").expect("rows").clone();
    assert_eq!(first.get("id"), Some(&json!(1)));
    assert_eq!(first.get("label"), Some(&json!("one")));
    assert_eq!(first.get("flag"), Some(&json!(true)));
    assert_eq!(first.get("extra"), Some(&json!({"k": 1})));

    must_execute(&mut db, &format!("DROP TABLE {table}"));
}

#[test]
fn failed_bulk_insert_persists_nothing() {
    let Some(pool) = live_pool(4) else { return };
    let table = table_name("atomic");
    let mut db = Database::new(pool);
    must_execute(&mut db, &format!("DROP TABLE IF EXISTS {table}"));
    must_execute(&mut db, &format!("CREATE TABLE {table} (id INT PRIMARY KEY)"));

    let rows = vec![vec![json!(1)], vec![json!(2)], vec![json!(1)]];
    let envelope = db.execute_many(&format!("INSERT INTO {table} (id) VALUES :rows"), &rows);
    assert!(envelope.unique_violation());

    let count = db.execute(&format!("SELECT COUNT(*) AS n FROM {table}"), &ParamMap::new());
    assert_eq!(count.first_row().expect("success").and_then(|row| row.get("n")), Some(&json!(0)));

    must_execute(&mut db, &format!("DROP TABLE {table}"));
}

#[test]
fn raised_exception_surfaces_code_and_notices_are_captured() {
    let Some(pool) = live_pool(4) else { return };
    let mut db = Database::new(pool);
    db.set_notices(true);

    let notice = db.execute(
        "DO $$ BEGIN RAISE NOTICE 'rowpost says hello'; END $$",
        &ParamMap::new(),
    );
    assert!(notice.is_success());
    assert!(
        notice
            .notices()
            .expect("capture enabled")
            .iter()
            .any(|message| message.contains("rowpost says hello"))
    );

    let raised = db.execute("DO $$ BEGIN RAISE EXCEPTION 'no dice'; END $$", &ParamMap::new());
    assert!(raised.raised_exception());
    assert_eq!(raised.code(), codes::RAISED_EXCEPTION);
    assert!(
        raised.diagnostics().expect("server diagnostics").message_primary.contains("no dice")
    );
}

#[test]
fn failed_statements_return_their_connection_to_the_pool() {
    let Some(pool) = live_pool(2) else { return };
    let mut db = Database::new(pool.clone());
    must_execute(&mut db, "SELECT 1 AS warmup");
    let idle_before = pool.state().idle_connections;
    for _ in 0 .. 4 {
        let envelope = db.execute("SELECT * FROM rowpost_no_such_table", &ParamMap::new());
        assert!(envelope.is_error());
    }
    assert_eq!(pool.state().idle_connections, idle_before);
}

#[test]
fn concurrent_operations_respect_the_pool_bound() {
    let Some(pool) = live_pool(2) else { return };
    let handles: Vec<_> = (0 .. 8)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || {
                let mut db = Database::new(pool);
                db.execute("SELECT pg_sleep(0.05)", &ParamMap::new())
            })
        })
        .collect();
    for handle in handles {
        let envelope = handle.join().expect("worker thread");
        assert!(envelope.is_success(), "concurrent execute failed: {:?}", envelope.message());
    }
    let state = pool.state();
    assert!(state.connections <= 2);
}
