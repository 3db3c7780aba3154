//! SQLite handle shared by the repositories.
//!
//! One connection behind a `Mutex`; every repository call locks it for the
//! length of a single statement or transaction. Idea writes go through
//! [`Database::with_transaction`] so the owner's `idea_count` never drifts
//! from the rows in `ideas`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, Transaction};
use tracing::info;

use hatch_core::error::HatchError;

use crate::migrations;

/// How long a statement waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file, creating parent directories.
    pub fn new(path: &Path) -> Result<Self, HatchError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| HatchError::Storage(format!("Failed to open database: {}", e)))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(pragma_err)?;

        let db = Self::prepare(conn)?;
        info!(path = %path.display(), "Hatch database ready");
        Ok(db)
    }

    /// A private in-memory database, used by tests.
    pub fn in_memory() -> Result<Self, HatchError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| HatchError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        Self::prepare(conn)
    }

    /// Settings every connection needs (ownership cascades rely on foreign
    /// keys), then migrations.
    fn prepare(conn: Connection) -> Result<Self, HatchError> {
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(pragma_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(pragma_err)?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, HatchError> {
        self.conn
            .lock()
            .map_err(|e| HatchError::Storage(format!("Database lock poisoned: {}", e)))
    }

    /// Run `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, HatchError>
    where
        F: FnOnce(&Connection) -> Result<T, HatchError>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside a transaction. Commits when `f` returns `Ok`; any
    /// error rolls everything back.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, HatchError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, HatchError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| HatchError::Storage(format!("Failed to begin transaction: {}", e)))?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(|e| HatchError::Storage(format!("Failed to commit: {}", e)))?;
        Ok(value)
    }
}

fn pragma_err(e: rusqlite::Error) -> HatchError {
    HatchError::Storage(format!("Failed to configure connection: {}", e))
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
