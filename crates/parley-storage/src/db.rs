//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode and recommended PRAGMAs on initialization.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, info};

use parley_core::error::ParleyError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
///
/// The connection is wrapped in a Mutex since rusqlite Connection is not
/// Sync. Every unit of work holds the lock for its whole duration, so a
/// transaction is never interleaved with another caller's statements.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode, synchronous=NORMAL, foreign keys, and runs
    /// all pending migrations.
    pub fn new(path: &Path) -> Result<Self, ParleyError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| ParleyError::Persistence(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| ParleyError::Persistence(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, ParleyError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            ParleyError::Persistence(format!("Failed to open in-memory db: {}", e))
        })?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| ParleyError::Persistence(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ParleyError>
    where
        F: FnOnce(&Connection) -> Result<T, ParleyError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ParleyError::Persistence(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run a closure inside one IMMEDIATE transaction.
    ///
    /// Commits when the closure returns `Ok`. On `Err` (or a panic) the
    /// transaction is dropped uncommitted and rusqlite rolls it back, so no
    /// statement issued by the closure survives.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, ParleyError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, ParleyError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| ParleyError::Persistence(format!("Database lock poisoned: {}", e)))?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| ParleyError::Persistence(format!("Failed to begin transaction: {}", e)))?;

        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(|e| {
                    ParleyError::Persistence(format!("Failed to commit transaction: {}", e))
                })?;
                Ok(value)
            }
            Err(e) => {
                debug!(error = %e, "Rolling back transaction");
                tx.rollback().map_err(|rb| {
                    ParleyError::Persistence(format!("Rollback failed after '{}': {}", e, rb))
                })?;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

/// Wrap a rusqlite error with a short description of what was attempted.
pub(crate) fn storage_err(context: &'static str) -> impl FnOnce(rusqlite::Error) -> ParleyError {
    move |e| ParleyError::Persistence(format!("{}: {}", context, e))
}

/// Convert stored epoch milliseconds back into a UTC timestamp.
pub(crate) fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>, ParleyError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ParleyError::Persistence(format!("Invalid stored timestamp: {}", ms)))
}

/// Convert stored epoch seconds back into a UTC timestamp.
pub(crate) fn secs_to_utc(secs: i64) -> Result<DateTime<Utc>, ParleyError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| ParleyError::Persistence(format!("Invalid stored timestamp: {}", secs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_transcripts(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM transcripts", [], |row| row.get(0))
                .map_err(|e| ParleyError::Persistence(e.to_string()))
        })
        .unwrap()
    }

    fn insert_participant(tx: &Transaction<'_>, email: &str) -> Result<(), ParleyError> {
        tx.execute(
            "INSERT INTO participants (name, email) VALUES ('x', ?1)",
            [email],
        )
        .map_err(|e| ParleyError::Persistence(e.to_string()))?;
        Ok(())
    }

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().unwrap();
        assert_eq!(count_transcripts(&db), 0);
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");
        let db = Database::new(&path).unwrap();

        assert_eq!(count_transcripts(&db), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            let on: i64 = conn
                .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                .map_err(|e| ParleyError::Persistence(e.to_string()))?;
            assert_eq!(on, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let db = Database::in_memory().unwrap();
        db.with_transaction(|tx| insert_participant(tx, "a@b.io"))
            .unwrap();

        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM participants", [], |row| row.get(0))
                    .map_err(|e| ParleyError::Persistence(e.to_string()))
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let db = Database::in_memory().unwrap();
        let result: Result<(), ParleyError> = db.with_transaction(|tx| {
            insert_participant(tx, "a@b.io")?;
            Err(ParleyError::Persistence("boom".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM participants", [], |row| row.get(0))
                    .map_err(|e| ParleyError::Persistence(e.to_string()))
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_timestamp_helpers() {
        let ts = millis_to_utc(1_709_287_200_000).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert_eq!(secs_to_utc(0).unwrap().timestamp(), 0);
    }
}
