// ── Graph: Checkpoints ──────────────────────────────────────────────────────
// One row per successful compile. Versions are dense and strictly increasing.

use super::GraphStore;
use crate::atoms::error::EngineResult;
use crate::atoms::soul_types::{Checkpoint, NewCheckpoint};
use crate::engine::now_timestamp;
use log::info;
use rusqlite::{params, Connection, OptionalExtension};

const CHECKPOINT_COLUMNS: &str =
    "checkpoint_id, version, node_count, edge_count, capsule_hash, created_at, actor_id, capsule_node_ids";

impl GraphStore {
    /// Record the current graph size under the next version number.
    pub fn create_checkpoint(&self, new: NewCheckpoint) -> EngineResult<Checkpoint> {
        let conn = self.conn.lock();
        Self::create_checkpoint_locked(&conn, new)
    }

    pub(crate) fn create_checkpoint_locked(
        conn: &Connection,
        new: NewCheckpoint,
    ) -> EngineResult<Checkpoint> {
        let version: i64 =
            conn.query_row("SELECT COALESCE(MAX(version), 0) + 1 FROM checkpoints", [], |r| {
                r.get(0)
            })?;
        let node_count: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))?;
        let edge_count: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |r| r.get(0))?;

        let checkpoint = Checkpoint {
            checkpoint_id: uuid::Uuid::new_v4().to_string(),
            version,
            node_count: node_count as usize,
            edge_count: edge_count as usize,
            capsule_hash: new.capsule_hash,
            created_at: now_timestamp(),
            actor_id: new.actor_id,
            capsule_node_ids: new.capsule_node_ids,
        };
        conn.execute(
            "INSERT INTO checkpoints (checkpoint_id, version, node_count, edge_count,
                                      capsule_hash, created_at, actor_id, capsule_node_ids)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                checkpoint.checkpoint_id,
                checkpoint.version,
                node_count,
                edge_count,
                checkpoint.capsule_hash,
                checkpoint.created_at,
                checkpoint.actor_id,
                serde_json::to_string(&checkpoint.capsule_node_ids)?,
            ],
        )?;
        info!(
            "[graph] Checkpoint v{} ({} nodes, {} edges) by {}",
            checkpoint.version, checkpoint.node_count, checkpoint.edge_count, checkpoint.actor_id
        );
        Ok(checkpoint)
    }

    pub fn latest_checkpoint(&self) -> EngineResult<Option<Checkpoint>> {
        let conn = self.conn.lock();
        Self::latest_checkpoint_locked(&conn)
    }

    pub(crate) fn latest_checkpoint_locked(conn: &Connection) -> EngineResult<Option<Checkpoint>> {
        let sql = format!(
            "SELECT {} FROM checkpoints ORDER BY version DESC LIMIT 1",
            CHECKPOINT_COLUMNS
        );
        let cp = conn.query_row(&sql, [], checkpoint_from_row).optional()?;
        Ok(cp)
    }

    /// Most recent first.
    pub fn list_checkpoints(&self, limit: usize) -> EngineResult<Vec<Checkpoint>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM checkpoints ORDER BY version DESC LIMIT ?1",
            CHECKPOINT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64], checkpoint_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn checkpoint_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
    let ids_json: String = row.get(7)?;
    let capsule_node_ids: Vec<String> = serde_json::from_str(&ids_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let node_count: i64 = row.get(2)?;
    let edge_count: i64 = row.get(3)?;
    Ok(Checkpoint {
        checkpoint_id: row.get(0)?,
        version: row.get(1)?,
        node_count: node_count as usize,
        edge_count: edge_count as usize,
        capsule_hash: row.get(4)?,
        created_at: row.get(5)?,
        actor_id: row.get(6)?,
        capsule_node_ids,
    })
}
