//! SQLite connection handle.

use rusqlite::{Connection, OpenFlags};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use relgraph_core::error::{MigrationError, MigrationResult};

/// A single SQLite connection shared behind a mutex.
#[derive(Debug)]
pub struct SourcePool {
    conn: Mutex<Connection>,
    location: String,
}

impl SourcePool {
    /// Open a source database read-only.
    ///
    /// Accepts `sqlite:<path>`, `sqlite://<path>`, `jdbc:sqlite:<path>`, a
    /// bare path, or `:memory:`.
    pub fn open(url: &str) -> MigrationResult<Self> {
        let path = sqlite_path(url);
        if path == ":memory:" {
            return Self::in_memory();
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| MigrationError::connection(format!("cannot open SQLite database '{path}': {e}")))?;
        debug!(path, "SQLite source opened");
        Ok(Self {
            conn: Mutex::new(conn),
            location: path.to_string(),
        })
    }

    /// Writable in-memory database, used for fixtures.
    pub fn in_memory() -> MigrationResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MigrationError::connection(format!("cannot open in-memory database: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
            location: ":memory:".to_string(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn lock(&self) -> MigrationResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MigrationError::source_read("SQLite connection lock poisoned"))
    }

    /// Run `f` against the connection, mapping SQLite errors to source read errors.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> MigrationResult<T> {
        let conn = self.lock()?;
        f(&conn).map_err(|e| MigrationError::source_read(e.to_string()))
    }

    pub fn execute_batch(&self, sql: &str) -> MigrationResult<()> {
        self.with_conn(|conn| conn.execute_batch(sql))
    }
}

fn sqlite_path(url: &str) -> &str {
    let url = url.trim();
    ["jdbc:sqlite:", "sqlite://", "sqlite:"]
        .iter()
        .find_map(|prefix| url.strip_prefix(prefix))
        .unwrap_or(url)
}
