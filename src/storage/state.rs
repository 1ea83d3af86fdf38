//! Crawl-state store
//!
//! Keeps what a crawl needs to resume after a restart: the requests still
//! waiting in the frontier and, with the persistent dedup strategy, every
//! key the dedup filter has marked.

use crate::crawler::{DedupKind, FetchRequest, FrontierError, FrontierStore, SeenSet};
use crate::storage::schema::initialize_state_schema;
use crate::storage::traits::{StorageError, StorageResult};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed frontier mirror and seen-set
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Opens (or creates) the state database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        initialize_state_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory store (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_state_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Drops every pending frontier entry
    pub fn clear_frontier(&self) -> StorageResult<()> {
        self.lock()?.execute("DELETE FROM frontier", [])?;
        Ok(())
    }

    /// Drops every persisted dedup key
    pub fn clear_seen(&self) -> StorageResult<()> {
        self.lock()?.execute("DELETE FROM seen", [])?;
        Ok(())
    }

    /// Number of pending frontier entries
    pub fn frontier_len(&self) -> StorageResult<usize> {
        let n: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM frontier", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl FrontierStore for StateStore {
    fn append(&self, request: &FetchRequest) -> Result<i64, StorageError> {
        let json = serde_json::to_string(request)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO frontier (priority, request) VALUES (?1, ?2)",
            params![request.priority.as_i64(), json],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn remove(&self, seq: i64) -> Result<(), StorageError> {
        self.lock()?
            .execute("DELETE FROM frontier WHERE seq = ?1", params![seq])?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<(i64, FetchRequest)>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT seq, request FROM frontier ORDER BY seq")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq, json)| {
                serde_json::from_str(&json)
                    .map(|request| (seq, request))
                    .map_err(|e| StorageError::Corrupt(format!("frontier entry {}: {}", seq, e)))
            })
            .collect()
    }
}

impl SeenSet for StateStore {
    fn seen(&self, kind: DedupKind, key: &str) -> Result<bool, FrontierError> {
        let n: i64 = self
            .lock()?
            .query_row(
                "SELECT COUNT(*) FROM seen WHERE kind = ?1 AND key = ?2",
                params![kind.as_str(), key],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;
        Ok(n > 0)
    }

    fn insert(&self, kind: DedupKind, key: &str) -> Result<bool, FrontierError> {
        let changed = self
            .lock()?
            .execute(
                "INSERT OR IGNORE INTO seen (kind, key) VALUES (?1, ?2)",
                params![kind.as_str(), key],
            )
            .map_err(StorageError::from)?;
        Ok(changed == 1)
    }

    fn clear(&self) -> Result<(), FrontierError> {
        Ok(self.clear_seen()?)
    }
}
