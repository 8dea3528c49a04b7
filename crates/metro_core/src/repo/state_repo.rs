//! Workspace state repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist JSON values under string keys, scoped to one workspace.
//! - Provide typed read/write helpers on top of raw JSON values.
//!
//! # Invariants
//! - `put_value` is an upsert; the previous value for the key is replaced.
//! - Reads reject values that are not valid JSON instead of masking them.

use crate::db::DbError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for workspace state persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid workspace state data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Key-value persistence for per-workspace state.
pub trait WorkspaceStateRepository {
    /// Reads the JSON value stored under `key`.
    fn get_value(&self, key: &str) -> RepoResult<Option<Value>>;
    /// Replaces the JSON value stored under `key`.
    fn put_value(&self, key: &str, value: &Value) -> RepoResult<()>;
    /// Deletes `key`; returns whether a row existed.
    fn delete_value(&self, key: &str) -> RepoResult<bool>;
}

/// SQLite-backed workspace state repository.
///
/// Owns its connection so the layout store can hold it for the session.
pub struct SqliteWorkspaceStateRepository {
    conn: Connection,
}

impl SqliteWorkspaceStateRepository {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - Returns `InvalidData` when the `workspace_state` table is missing,
    ///   which means the connection was not opened through `open_db*`.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'workspace_state'
            );",
            [],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::InvalidData(
                "workspace_state table is missing; run migrations first".to_string(),
            ));
        }
        Ok(Self { conn })
    }
}

impl WorkspaceStateRepository for SqliteWorkspaceStateRepository {
    fn get_value(&self, key: &str) -> RepoResult<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM workspace_state WHERE key = ?1;",
                [key],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|text| {
            serde_json::from_str(&text)
                .map_err(|err| RepoError::InvalidData(format!("key `{key}`: {err}")))
        })
        .transpose()
    }

    fn put_value(&self, key: &str, value: &Value) -> RepoResult<()> {
        let text = serde_json::to_string(value)
            .map_err(|err| RepoError::InvalidData(format!("key `{key}`: {err}")))?;
        self.conn.execute(
            "INSERT INTO workspace_state (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now') * 1000)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![key, text],
        )?;
        Ok(())
    }

    fn delete_value(&self, key: &str) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM workspace_state WHERE key = ?1;", [key])?;
        Ok(changed > 0)
    }
}

/// Reads and deserializes the value stored under `key`.
pub fn read_state<T: DeserializeOwned>(
    repo: &dyn WorkspaceStateRepository,
    key: &str,
) -> RepoResult<Option<T>> {
    repo.get_value(key)?
        .map(|value| {
            serde_json::from_value(value)
                .map_err(|err| RepoError::InvalidData(format!("key `{key}`: {err}")))
        })
        .transpose()
}

/// Serializes `value` and stores it under `key`.
pub fn write_state<T: Serialize + ?Sized>(
    repo: &dyn WorkspaceStateRepository,
    key: &str,
    value: &T,
) -> RepoResult<()> {
    let json = serde_json::to_value(value)
        .map_err(|err| RepoError::InvalidData(format!("key `{key}`: {err}")))?;
    repo.put_value(key, &json)
}

/// Process-local repository used when no workspace database is available.
///
/// Values live only as long as the owning store.
#[derive(Debug, Default)]
pub struct MemoryStateRepository {
    values: RefCell<BTreeMap<String, Value>>,
}

impl WorkspaceStateRepository for MemoryStateRepository {
    fn get_value(&self, key: &str) -> RepoResult<Option<Value>> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn put_value(&self, key: &str, value: &Value) -> RepoResult<()> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn delete_value(&self, key: &str) -> RepoResult<bool> {
        Ok(self.values.borrow_mut().remove(key).is_some())
    }
}
