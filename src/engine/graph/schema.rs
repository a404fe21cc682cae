// ── Graph: Database Schema ──────────────────────────────────────────────────
//
// Tables:
//   - nodes: beliefs with their six weight columns (range CHECKs)
//   - nodes_fts: FTS5 index over premise (BM25 ranking)
//   - edges: typed links between nodes
//   - evidence_links: node → archive event hash
//   - checkpoints: one row per successful compile
//
// All statements are idempotent (CREATE IF NOT EXISTS).

use crate::atoms::error::EngineResult;
use log::info;
use rusqlite::Connection;

pub(crate) fn run_migrations(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch(GRAPH_SCHEMA)?;
    info!("[graph] Schema ready");
    Ok(())
}

const GRAPH_SCHEMA: &str = "
    -- ═══════════════════════════════════════════════════════════════
    -- Nodes
    -- Weight columns carry CHECKs: an out-of-range vector can never be
    -- stored, even if a caller skipped clamping.
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS nodes (
        node_id TEXT PRIMARY KEY,
        premise TEXT NOT NULL,
        node_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',

        salience REAL NOT NULL CHECK (salience BETWEEN 0.0 AND 1.0),
        valence REAL NOT NULL CHECK (valence BETWEEN -1.0 AND 1.0),
        arousal REAL NOT NULL CHECK (arousal BETWEEN 0.0 AND 1.0),
        commitment REAL NOT NULL CHECK (commitment BETWEEN 0.0 AND 1.0),
        uncertainty REAL NOT NULL CHECK (uncertainty BETWEEN 0.0 AND 1.0),
        resonance REAL NOT NULL CHECK (resonance BETWEEN 0.0 AND 1.0),

        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        created_by TEXT NOT NULL DEFAULT '',
        version INTEGER NOT NULL DEFAULT 1,

        spatial_lat REAL,
        spatial_lng REAL,
        spatial_name TEXT,
        temporal_start TEXT,
        temporal_end TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_nodes_status_salience
        ON nodes(status, salience DESC);
    CREATE INDEX IF NOT EXISTS idx_nodes_type
        ON nodes(node_type);

    CREATE TRIGGER IF NOT EXISTS nodes_version_monotonic
    BEFORE UPDATE ON nodes
    WHEN NEW.version <= OLD.version
    BEGIN
        SELECT RAISE(ABORT, 'node version must increase');
    END;

    -- FTS5 index for premise search (BM25 ranking)
    CREATE VIRTUAL TABLE IF NOT EXISTS nodes_fts USING fts5(
        node_id UNINDEXED,
        premise,
        content=nodes,
        content_rowid=rowid,
        tokenize='porter unicode61'
    );

    CREATE TRIGGER IF NOT EXISTS nodes_fts_insert AFTER INSERT ON nodes
    BEGIN
        INSERT INTO nodes_fts(rowid, node_id, premise)
        VALUES (NEW.rowid, NEW.node_id, NEW.premise);
    END;

    CREATE TRIGGER IF NOT EXISTS nodes_fts_delete AFTER DELETE ON nodes
    BEGIN
        INSERT INTO nodes_fts(nodes_fts, rowid, node_id, premise)
        VALUES ('delete', OLD.rowid, OLD.node_id, OLD.premise);
    END;

    CREATE TRIGGER IF NOT EXISTS nodes_fts_update AFTER UPDATE OF premise ON nodes
    BEGIN
        INSERT INTO nodes_fts(nodes_fts, rowid, node_id, premise)
        VALUES ('delete', OLD.rowid, OLD.node_id, OLD.premise);
        INSERT INTO nodes_fts(rowid, node_id, premise)
        VALUES (NEW.rowid, NEW.node_id, NEW.premise);
    END;

    -- ═══════════════════════════════════════════════════════════════
    -- Edges
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS edges (
        edge_id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL REFERENCES nodes(node_id),
        target_id TEXT NOT NULL REFERENCES nodes(node_id),
        relation TEXT NOT NULL,
        strength REAL NOT NULL DEFAULT 0.5 CHECK (strength BETWEEN 0.0 AND 1.0),
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_edges_source
        ON edges(source_id);
    CREATE INDEX IF NOT EXISTS idx_edges_target
        ON edges(target_id);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_triple
        ON edges(source_id, target_id, relation);

    -- ═══════════════════════════════════════════════════════════════
    -- Evidence Links (node → archive event)
    -- No FK on event_hash: the archive lives in its own database.
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS evidence_links (
        node_id TEXT NOT NULL REFERENCES nodes(node_id),
        event_hash TEXT NOT NULL,
        link_type TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (node_id, event_hash, link_type)
    );

    CREATE INDEX IF NOT EXISTS idx_evidence_event
        ON evidence_links(event_hash);

    -- ═══════════════════════════════════════════════════════════════
    -- Checkpoints
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS checkpoints (
        checkpoint_id TEXT PRIMARY KEY,
        version INTEGER NOT NULL UNIQUE,
        node_count INTEGER NOT NULL,
        edge_count INTEGER NOT NULL,
        capsule_hash TEXT NOT NULL,
        capsule_node_ids TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        actor_id TEXT NOT NULL
    );
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
    fn weight_checks_reject_out_of_range_rows() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO nodes (node_id, premise, node_type, salience, valence, arousal,
                                commitment, uncertainty, resonance, created_at, updated_at)
             VALUES ('n', 'p', 'premise', 1.5, 0, 0, 0, 0, 0, 't', 't')",
            [],
        );
        assert!(result.is_err());
    }
}
