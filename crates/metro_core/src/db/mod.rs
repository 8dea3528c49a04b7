//! Workspace side-store database: connection bootstrap and schema upgrades.
//!
//! # Responsibility
//! - Hand out connections to `.vscode/metro-state.sqlite3` that are ready
//!   for the `workspace_state` key/value table.
//!
//! # Invariants
//! - The schema version lives in `PRAGMA user_version`.
//! - A connection is only returned after every pending upgrade committed.
//! - A database written by a newer binary is refused, never downgraded.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file carries a schema version this binary does not know.
    SchemaTooNew { found: u32, supported: u32 },
    /// One upgrade step failed; nothing from the batch was committed.
    MigrationFailed {
        version: u32,
        source: rusqlite::Error,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "state database error: {err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "state database is at schema {found}, this build only knows up to {supported}"
            ),
            Self::MigrationFailed { version, source } => {
                write!(f, "state database upgrade to schema {version} failed: {source}")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::MigrationFailed { source, .. } => Some(source),
            Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
