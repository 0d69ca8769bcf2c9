//! Durable persistence for VM records.
//!
//! A single embedded SQLite file under `<state_root>/agent.db`, opened
//! with an exclusive connection lock. Records are stored as a
//! self-describing JSON blob alongside a few queryable columns (id,
//! language, status, created_at): flexible schema evolution, fast
//! filtering on the columns that matter.

mod schema;
mod vm_store;

use std::path::Path;
use std::sync::Arc;

use agent_shared::{AgentError, AgentResult};
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OptionalExtension};

pub use vm_store::VmStore;

macro_rules! db_err {
    ($result:expr) => {
        $result.map_err(|e| AgentError::Database(e.to_string()))
    };
}
pub(crate) use db_err;

/// SQLite database handle, thread-safe via `parking_lot::Mutex`.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(db_path: &Path) -> AgentResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = db_err!(Connection::open(db_path))?;

        db_err!(conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=FULL;
            PRAGMA foreign_keys=ON;
            PRAGMA busy_timeout=100000;
            "
        ))?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Release the underlying file handle.
    ///
    /// `Database`/`VmStore` release their SQLite handle on `Drop`
    /// already; this is an explicit, eager variant for callers that
    /// need the file unlocked before the value goes out of scope, e.g.
    /// closing the old store before opening a new one against the same
    /// file across a process restart.
    pub fn close(self) {
        drop(self);
    }

    fn init_schema(conn: &Connection) -> AgentResult<()> {
        for sql in schema::all_schemas() {
            db_err!(conn.execute_batch(sql))?;
        }

        let current_version: Option<i32> = db_err!(
            conn.query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
        )?;

        match current_version {
            None => {
                let now = Utc::now().to_rfc3339();
                db_err!(conn.execute(
                    "INSERT INTO schema_version (id, version, updated_at) VALUES (1, ?1, ?2)",
                    rusqlite::params![schema::SCHEMA_VERSION, now],
                ))?;
                tracing::info!("initialized vm store schema version {}", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(AgentError::Database(format!(
                    "store schema version {v} is newer than supported {}",
                    schema::SCHEMA_VERSION
                )));
            }
            Some(_) => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_schema() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let _db = Database::open(&db_path).unwrap();
        assert!(db_path.exists());
    }
}
