//! SQLite storage bootstrap for journey timelines.
//!
//! # Responsibility
//! - Open and configure connections used by the timeline repository.
//! - Apply embedded schema migrations before any journey data is touched.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`.
//! - A database written by a newer binary is never opened for writes.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl DbError {
    /// Returns whether this failure may succeed on retry (lock contention,
    /// busy database), as opposed to a permanent schema mismatch.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            Self::Sqlite(_) => false,
            Self::UnsupportedSchemaVersion { .. } => false,
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "journey database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

#[cfg(test)]
mod tests {
    use super::DbError;

    fn sqlite_failure(code: std::os::raw::c_int) -> DbError {
        DbError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            None,
        ))
    }

    #[test]
    fn only_lock_contention_is_transient() {
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_BUSY).is_transient());
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_LOCKED).is_transient());
        assert!(!sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT).is_transient());
        assert!(!DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows).is_transient());
        assert!(!DbError::UnsupportedSchemaVersion {
            db_version: 9,
            latest_supported: 2,
        }
        .is_transient());
    }
}
