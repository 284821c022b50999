//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode and recommended PRAGMAs on initialization, then runs
//! migrations and (optionally) the sample-data seed.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use querydesk_core::error::QueryDeskError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
///
/// The connection is wrapped in a Mutex since rusqlite Connection is not Sync.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path and seed the sample
    /// tables when they are empty.
    pub fn new(path: &Path) -> Result<Self, QueryDeskError> {
        Self::open(path, true)
    }

    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode, synchronous=NORMAL, foreign keys, and runs all
    /// pending migrations. `seed` controls whether the sample rows are loaded.
    pub fn open(path: &Path, seed: bool) -> Result<Self, QueryDeskError> {
        if path == Path::new(":memory:") {
            return Self::in_memory_with(seed);
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| QueryDeskError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -16384;",
        )
        .map_err(|e| QueryDeskError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        Self::initialize(conn, seed)
    }

    /// Open a seeded in-memory database (for testing).
    pub fn in_memory() -> Result<Self, QueryDeskError> {
        Self::in_memory_with(true)
    }

    /// Open an in-memory database, optionally seeded.
    pub fn in_memory_with(seed: bool) -> Result<Self, QueryDeskError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            QueryDeskError::Storage(format!("Failed to open in-memory db: {}", e))
        })?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| QueryDeskError::Storage(format!("Failed to set pragmas: {}", e)))?;

        Self::initialize(conn, seed)
    }

    fn initialize(conn: Connection, seed: bool) -> Result<Self, QueryDeskError> {
        let db = Self {
            conn: Mutex::new(conn),
        };

        db.with_conn(migrations::run_migrations)?;
        if seed {
            db.with_conn(migrations::seed_sample_data)?;
        }

        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// This is the primary way to interact with the database. The mutex
    /// is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, QueryDeskError>
    where
        F: FnOnce(&Connection) -> Result<T, QueryDeskError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| QueryDeskError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Cheap connectivity probe used by the health endpoint.
    pub fn ping(&self) -> bool {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| QueryDeskError::Storage(e.to_string()))
        })
        .is_ok()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(db: &Database, table: &str) -> i64 {
        db.with_conn(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .map_err(|e| QueryDeskError::Storage(e.to_string()))
        })
        .unwrap()
    }

    #[test]
    fn test_in_memory_database_is_seeded() {
        let db = Database::in_memory().unwrap();
        assert!(count(&db, "users") > 0);
        assert!(count(&db, "orders") > 0);
    }

    #[test]
    fn test_in_memory_without_seed_is_empty() {
        let db = Database::in_memory_with(false).unwrap();
        assert_eq!(count(&db, "users"), 0);
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("test.db");
        let db = Database::new(&path).unwrap();
        assert!(count(&db, "products") > 0);
        assert!(path.exists());
    }

    #[test]
    fn test_reopen_does_not_duplicate_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let first = {
            let db = Database::new(&path).unwrap();
            count(&db, "users")
        };
        let db = Database::new(&path).unwrap();
        assert_eq!(count(&db, "users"), first);
    }

    #[test]
    fn test_memory_path_opens_in_memory() {
        let db = Database::open(Path::new(":memory:"), false).unwrap();
        assert_eq!(count(&db, "orders"), 0);
    }

    #[test]
    fn test_ping() {
        let db = Database::in_memory().unwrap();
        assert!(db.ping());
    }

    #[test]
    fn test_wal_mode_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("wal.db")).unwrap();
        db.with_conn(|conn| {
            let mode: String = conn
                .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .map_err(|e| QueryDeskError::Storage(e.to_string()))?;
            assert_eq!(mode, "wal");
            Ok(())
        })
        .unwrap();
    }
}
