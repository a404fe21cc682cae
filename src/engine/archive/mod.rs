// Soul Archive — append-only, hash-chained event log.
// The trust root of the engine: rows are inserted, never updated or deleted
// (the schema installs triggers that abort UPDATE/DELETE). Corrections exist
// only as new events.
//
// Module layout:
//   schema  — table, indexes, append-only triggers
//   events  — hashing, append, queries
//   verify  — full-chain integrity walk

use crate::atoms::error::EngineResult;
use crate::engine::paths::StoragePaths;
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;

mod events;
mod schema;
mod verify;

pub use events::{canonical_json, hash_event};

/// Thread-safe archive handle. One connection per process.
pub struct ArchiveStore {
    /// The SQLite connection, protected by a Mutex.
    /// `pub` for integration tests that tamper with rows out-of-band.
    pub conn: Mutex<Connection>,
}

impl ArchiveStore {
    /// Open (or create) `archive.db` under `paths` and initialize tables.
    pub fn open(paths: &StoragePaths) -> EngineResult<Self> {
        paths.ensure()?;
        let path = paths.archive_db();
        info!("[archive] Opening archive at {:?}", path);

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA synchronous=FULL;").ok();

        schema::run_migrations(&conn)?;
        Ok(ArchiveStore { conn: Mutex::new(conn) })
    }

    /// Volatile archive for tests and dry runs.
    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(ArchiveStore { conn: Mutex::new(conn) })
    }
}
