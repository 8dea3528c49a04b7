use metro_core::db::migrations::{latest_version, schema_version};
use metro_core::db::{open_db, open_db_in_memory, DbError};
use metro_core::{SqliteWorkspaceStateRepository, WorkspaceStateRepository};
use rusqlite::Connection;
use serde_json::json;

/// `(name, declared type, not null, primary key)` per column.
fn columns(conn: &Connection, table: &str) -> Vec<(String, String, bool, bool)> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table});"))
        .unwrap();
    stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)? == 1,
            row.get::<_, i64>(5)? > 0,
        ))
    })
    .unwrap()
    .collect::<Result<_, _>>()
    .unwrap()
}

fn stored_row(conn: &Connection, key: &str) -> (String, i64) {
    conn.query_row(
        "SELECT value, updated_at FROM workspace_state WHERE key = ?1;",
        [key],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .unwrap()
}

#[test]
fn fresh_database_has_key_value_state_table() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    let column = |name: &str, ty: &str, not_null: bool, pk: bool| {
        (name.to_string(), ty.to_string(), not_null, pk)
    };
    assert_eq!(
        columns(&conn, "workspace_state"),
        vec![
            column("key", "TEXT", true, true),
            column("value", "TEXT", true, false),
            column("updated_at", "INTEGER", true, false),
        ]
    );
}

#[test]
fn updated_at_defaults_to_insert_time_in_millis() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO workspace_state (key, value) VALUES ('raw', '1');",
        [],
    )
    .unwrap();

    let (value, updated_at) = stored_row(&conn, "raw");
    assert_eq!(value, "1");
    let now_ms = chrono::Utc::now().timestamp_millis();
    assert!(updated_at > 0);
    assert!(updated_at <= now_ms + 1000);
    assert!(now_ms - updated_at < 60_000);
}

#[test]
fn repository_writes_upsert_one_row_per_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metro-state.sqlite3");
    let repo = SqliteWorkspaceStateRepository::try_new(open_db(&path).unwrap()).unwrap();

    repo.put_value("metro.completionTimes", &json!({ "/a.md": 1 }))
        .unwrap();
    repo.put_value("metro.completionTimes", &json!({ "/b.md": 2 }))
        .unwrap();
    drop(repo);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM workspace_state;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
    let (value, updated_at) = stored_row(&conn, "metro.completionTimes");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&value).unwrap(),
        json!({ "/b.md": 2 })
    );
    assert!(updated_at > 0);
}

#[test]
fn database_from_newer_build_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");
    Connection::open(&path)
        .unwrap()
        .execute_batch("PRAGMA user_version = 999;")
        .unwrap();

    match open_db(&path).unwrap_err() {
        DbError::SchemaTooNew { found, supported } => {
            assert_eq!(found, 999);
            assert_eq!(supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}
