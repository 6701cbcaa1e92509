use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::schema;

/// Shared SQLite connection. Cloning shares the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open or create a database at the given path, creating parent
    /// directories as needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create dir {}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        let db = Self::initialize(conn, path.to_owned())?;
        info!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize(conn, PathBuf::from(":memory:"))
    }

    fn initialize(conn: Connection, path: PathBuf) -> Result<Self, StoreError> {
        conn.execute_batch(schema::PRAGMAS)
            .map_err(|e| StoreError::Database(format!("pragmas: {e}")))?;
        conn.execute_batch(schema::CREATE_TABLES)
            .map_err(|e| StoreError::Database(format!("schema: {e}")))?;

        let stored: Option<u32> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .map_err(|e| StoreError::Database(format!("schema version: {e}")))?;
        match stored {
            None => {
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    [schema::SCHEMA_VERSION],
                )?;
                debug!(version = schema::SCHEMA_VERSION, "schema initialized");
            }
            Some(found) if found > schema::SCHEMA_VERSION => {
                return Err(StoreError::Database(format!(
                    "database schema v{found} is newer than supported v{}",
                    schema::SCHEMA_VERSION
                )));
            }
            Some(_) => {}
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Execute a closure with the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
