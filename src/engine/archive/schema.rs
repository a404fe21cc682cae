// Archive schema. Idempotent; called once by ArchiveStore::open().
// Adding a column: append an ALTER TABLE … ADD COLUMN with the error
// swallowed. Never modify existing SQL, and never add a column to the hash
// input without a format version (old rows would stop verifying).

use crate::atoms::error::EngineResult;
use log::info;
use rusqlite::Connection;

pub(crate) fn run_migrations(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch(ARCHIVE_SCHEMA)?;
    info!("[archive] Schema ready");
    Ok(())
}

const ARCHIVE_SCHEMA: &str = "
    -- seq is the insertion order the hash-chain walk follows.
    CREATE TABLE IF NOT EXISTS events (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        event_hash TEXT NOT NULL UNIQUE,
        parent_hash TEXT,
        timestamp TEXT NOT NULL,
        session_key TEXT NOT NULL,
        event_type TEXT NOT NULL,
        agent_id TEXT NOT NULL DEFAULT '',
        channel TEXT NOT NULL DEFAULT '',
        peer TEXT NOT NULL DEFAULT '',
        payload TEXT NOT NULL DEFAULT 'null'
    );

    CREATE INDEX IF NOT EXISTS idx_events_session
        ON events(session_key, seq);
    CREATE INDEX IF NOT EXISTS idx_events_timestamp
        ON events(timestamp);
    CREATE INDEX IF NOT EXISTS idx_events_agent
        ON events(agent_id, seq);
    CREATE INDEX IF NOT EXISTS idx_events_parent
        ON events(parent_hash);

    CREATE TRIGGER IF NOT EXISTS events_append_only_update
    BEFORE UPDATE ON events
    BEGIN
        SELECT RAISE(ABORT, 'archive events are append-only');
    END;

    CREATE TRIGGER IF NOT EXISTS events_append_only_delete
    BEFORE DELETE ON events
    BEGIN
        SELECT RAISE(ABORT, 'archive events are append-only');
    END;
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let result = run_migrations(&conn);
        assert!(result.is_ok(), "Second migration run failed: {:?}", result);
    }

    #[test]
    fn update_and_delete_are_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO events (event_hash, timestamp, session_key, event_type)
             VALUES ('h1', '2025-01-01T00:00:00.000Z', 's', 'message')",
            [],
        )
        .unwrap();

        assert!(conn.execute("UPDATE events SET payload = '1'", []).is_err());
        assert!(conn.execute("DELETE FROM events", []).is_err());
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }
}
