//! Single serialized SQLite connection.

use crate::error::StorageError;
use crate::store::schema::{apply_pragmas, run_migrations};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Owns the one connection every component shares. Access is serialized through
/// the mutex, so at most one transaction is open at a time.
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open a database at the given path, apply pragmas, run migrations.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| StorageError::from_sqlite(e, "open database"))?;
        apply_pragmas(&conn, true)?;
        run_migrations(&conn)?;
        debug!(path = %path.display(), "Opened analysis database");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::from_sqlite(e, "open in-memory database"))?;
        apply_pragmas(&conn, false)?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Run `f` against the connection outside any explicit transaction.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let guard = self.conn.lock();
        f(&guard)
    }

    /// Run `f` inside one transaction. Commits on `Ok`; rolls back on `Err` and
    /// returns the original error, or `RollbackFailed` if the rollback itself fails.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StorageError>,
    {
        let guard = self.conn.lock();
        let tx = guard
            .unchecked_transaction()
            .map_err(|e| StorageError::from_sqlite(e, "begin transaction"))?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()
                    .map_err(|e| StorageError::from_sqlite(e, "commit transaction"))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(error = %rollback_err, "Transaction rollback failed");
                    return Err(StorageError::RollbackFailed {
                        cause: err.to_string(),
                        message: rollback_err.to_string(),
                    });
                }
                debug!(error = %err, "Transaction rolled back");
                Err(err)
            }
        }
    }

    /// Database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
