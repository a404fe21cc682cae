// Soul Graph — weighted belief store derived from the archive.
// Nodes reference each other only by id (edges table); evidence links point
// into the archive by event hash, which makes the graph a routing index over
// the archive rather than a lossy summary of it.
//
// Module layout:
//   schema       — tables, FTS5 index, sync + invariant triggers
//   nodes        — node CRUD, weight/status updates, salience queries
//   edges        — edges + evidence links
//   search       — FTS5 BM25 premise search, maintenance
//   checkpoints  — versioned snapshot descriptors

use crate::atoms::error::{EngineError, EngineResult};
use crate::engine::paths::StoragePaths;
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;

mod checkpoints;
mod edges;
mod nodes;
mod schema;
mod search;

pub use search::sanitize_fts5_query;

/// Thread-safe graph handle. One connection per process.
pub struct GraphStore {
    /// The SQLite connection, protected by a Mutex.
    /// `pub` for integration tests that inspect rows directly.
    pub conn: Mutex<Connection>,
    /// Monotonic ULID source: node id order == insertion order.
    ids: Mutex<ulid::Generator>,
}

impl GraphStore {
    /// Open (or create) `graph.db` under `paths` and initialize tables.
    pub fn open(paths: &StoragePaths) -> EngineResult<Self> {
        paths.ensure()?;
        let path = paths.graph_db();
        info!("[graph] Opening graph at {:?}", path);

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        Self::from_connection(conn)
    }

    /// Volatile graph for tests and dry runs.
    pub fn open_in_memory() -> EngineResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> EngineResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::run_migrations(&conn)?;
        Ok(GraphStore {
            conn: Mutex::new(conn),
            ids: Mutex::new(ulid::Generator::new()),
        })
    }

    fn next_node_id(&self) -> EngineResult<String> {
        let id = self
            .ids
            .lock()
            .generate()
            .map_err(|e| EngineError::Other(format!("node id generation failed: {}", e)))?;
        Ok(id.to_string())
    }

    /// Fold the WAL into the main file so a plain file copy is complete.
    pub fn flush_wal(&self) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }
}
