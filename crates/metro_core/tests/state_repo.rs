use metro_core::db::{open_db, open_db_in_memory};
use metro_core::repo::state_repo::{read_state, write_state};
use metro_core::{RepoError, SqliteWorkspaceStateRepository, WorkspaceStateRepository};
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeMap;

fn repo() -> SqliteWorkspaceStateRepository {
    SqliteWorkspaceStateRepository::try_new(open_db_in_memory().unwrap()).unwrap()
}

#[test]
fn put_replaces_previous_value() {
    let repo = repo();
    repo.put_value("k", &json!({"a": 1})).unwrap();
    repo.put_value("k", &json!({"a": 2})).unwrap();

    assert_eq!(repo.get_value("k").unwrap(), Some(json!({"a": 2})));
    assert_eq!(repo.get_value("missing").unwrap(), None);
}

#[test]
fn delete_reports_whether_key_existed() {
    let repo = repo();
    repo.put_value("k", &json!(true)).unwrap();

    assert!(repo.delete_value("k").unwrap());
    assert!(!repo.delete_value("k").unwrap());
    assert_eq!(repo.get_value("k").unwrap(), None);
}

#[test]
fn typed_helpers_round_trip_completion_map() {
    let repo = repo();
    let mut times = BTreeMap::new();
    times.insert("/w/.Note/task/a.md".to_string(), 1_700_000_000_000_i64);
    write_state(&repo, "metro.taskCompletionTimes", &times).unwrap();

    let loaded: Option<BTreeMap<String, i64>> =
        read_state(&repo, "metro.taskCompletionTimes").unwrap();
    assert_eq!(loaded, Some(times));
}

#[test]
fn values_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metro-state.sqlite3");

    let repo = SqliteWorkspaceStateRepository::try_new(open_db(&path).unwrap()).unwrap();
    repo.put_value("metro.ghostTasks", &json!([{"id": "ghost-1", "label": "Plan"}]))
        .unwrap();
    drop(repo);

    let repo = SqliteWorkspaceStateRepository::try_new(open_db(&path).unwrap()).unwrap();
    assert_eq!(
        repo.get_value("metro.ghostTasks").unwrap(),
        Some(json!([{"id": "ghost-1", "label": "Plan"}]))
    );
}

#[test]
fn unmigrated_connection_is_rejected() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteWorkspaceStateRepository::try_new(conn)
        .err()
        .expect("bare connection must be rejected");
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn corrupt_stored_value_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metro-state.sqlite3");
    let conn = open_db(&path).unwrap();
    conn.execute(
        "INSERT INTO workspace_state (key, value) VALUES ('k', 'not json');",
        [],
    )
    .unwrap();

    let repo = SqliteWorkspaceStateRepository::try_new(conn).unwrap();
    assert!(matches!(
        repo.get_value("k"),
        Err(RepoError::InvalidData(_))
    ));
}
