// ── Graph: Node CRUD ────────────────────────────────────────────────────────
//
// Every write bumps `version` and `updated_at`; the schema trigger refuses
// any update that doesn't. Weight writes go through PartialWeight::apply_to or
// WeightVector::clamped, so nothing out of range reaches SQLite.

use super::GraphStore;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::soul_types::{
    NewNode, Node, NodeStatus, NodeType, PartialWeight, SpatialMeta, TemporalMeta, WeightVector,
};
use crate::engine::now_timestamp;
use crate::engine::weights;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

pub(super) const NODE_COLUMNS: &str = "n.node_id, n.premise, n.node_type, n.status,
    n.salience, n.valence, n.arousal, n.commitment, n.uncertainty, n.resonance,
    n.created_at, n.updated_at, n.created_by, n.version,
    n.spatial_lat, n.spatial_lng, n.spatial_name, n.temporal_start, n.temporal_end";

impl GraphStore {
    /// Insert a node. Unsupplied weight fields take the documented defaults.
    pub fn create_node(&self, new: NewNode) -> EngineResult<String> {
        if new.premise.trim().is_empty() {
            return Err(EngineError::validation(vec!["premise must not be empty".into()]));
        }
        let weight = new.weight.apply_to(WeightVector::default())?;
        let id = self.next_node_id()?;
        let now = now_timestamp();
        let spatial = new.spatial.unwrap_or_default();
        let temporal = new.temporal.unwrap_or_default();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO nodes (
                node_id, premise, node_type, status,
                salience, valence, arousal, commitment, uncertainty, resonance,
                created_at, updated_at, created_by, version,
                spatial_lat, spatial_lng, spatial_name, temporal_start, temporal_end
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8, ?9, ?10,
                ?11, ?11, ?12, 1,
                ?13, ?14, ?15, ?16, ?17
            )",
            params![
                id,
                new.premise,
                new.node_type.to_string(),
                new.status.to_string(),
                weight.salience,
                weight.valence,
                weight.arousal,
                weight.commitment,
                weight.uncertainty,
                weight.resonance,
                now,
                new.created_by,
                spatial.lat,
                spatial.lng,
                spatial.name,
                temporal.start,
                temporal.end,
            ],
        )?;

        info!("[graph] ✓ Created {} node {} ({})", new.node_type, id, new.status);
        Ok(id)
    }

    pub fn get_node(&self, id: &str) -> EngineResult<Option<Node>> {
        let conn = self.conn.lock();
        Self::get_node_locked(&conn, id)
    }

    pub(super) fn get_node_locked(conn: &Connection, id: &str) -> EngineResult<Option<Node>> {
        let sql = format!("SELECT {} FROM nodes n WHERE n.node_id = ?1", NODE_COLUMNS);
        let node = conn.query_row(&sql, params![id], Self::node_from_row).optional()?;
        Ok(node)
    }

    pub(super) fn node_exists_locked(conn: &Connection, id: &str) -> EngineResult<bool> {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM nodes WHERE node_id = ?1", params![id], |r| r.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Overwrite only the supplied weight fields (each clamped).
    pub fn update_node_weight(&self, id: &str, partial: &PartialWeight) -> EngineResult<Node> {
        let conn = self.conn.lock();
        let current =
            Self::get_node_locked(&conn, id)?.ok_or_else(|| EngineError::node_not_found(id))?;
        let weight = partial.apply_to(current.weight)?;
        Self::write_weight_locked(&conn, current, weight)
    }

    /// Replace the whole vector (clamped). Used after a weight transform.
    pub fn set_node_weight(&self, id: &str, weight: WeightVector) -> EngineResult<Node> {
        let conn = self.conn.lock();
        let current =
            Self::get_node_locked(&conn, id)?.ok_or_else(|| EngineError::node_not_found(id))?;
        Self::write_weight_locked(&conn, current, weight)
    }

    fn write_weight_locked(
        conn: &Connection,
        mut node: Node,
        weight: WeightVector,
    ) -> EngineResult<Node> {
        let fields = [
            weight.salience,
            weight.valence,
            weight.arousal,
            weight.commitment,
            weight.uncertainty,
            weight.resonance,
        ];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::InvalidWeight(format!(
                "non-finite weight for node {}",
                node.node_id
            )));
        }
        let weight = weight.clamped();
        let now = now_timestamp();
        conn.execute(
            "UPDATE nodes SET
                salience = ?2, valence = ?3, arousal = ?4,
                commitment = ?5, uncertainty = ?6, resonance = ?7,
                version = version + 1, updated_at = ?8
             WHERE node_id = ?1",
            params![
                node.node_id,
                weight.salience,
                weight.valence,
                weight.arousal,
                weight.commitment,
                weight.uncertainty,
                weight.resonance,
                now,
            ],
        )?;
        node.weight = weight;
        node.version += 1;
        node.updated_at = now;
        debug!("[graph] Node {} weight → v{}", node.node_id, node.version);
        Ok(node)
    }

    pub fn update_node_status(&self, id: &str, status: NodeStatus) -> EngineResult<Node> {
        let conn = self.conn.lock();
        let mut node =
            Self::get_node_locked(&conn, id)?.ok_or_else(|| EngineError::node_not_found(id))?;
        let now = now_timestamp();
        conn.execute(
            "UPDATE nodes SET status = ?2, version = version + 1, updated_at = ?3
             WHERE node_id = ?1",
            params![id, status.to_string(), now],
        )?;
        info!("[graph] Node {} status {} → {}", id, node.status, status);
        node.status = status;
        node.version += 1;
        node.updated_at = now;
        Ok(node)
    }

    /// Active nodes, salience descending (ties by id, i.e. insertion order).
    pub fn get_top_salience_nodes(&self, limit: usize) -> EngineResult<Vec<Node>> {
        self.list_by_status(NodeStatus::Active, limit)
    }

    /// Provisional nodes, salience descending.
    pub fn get_provisional_nodes(&self, limit: usize) -> EngineResult<Vec<Node>> {
        self.list_by_status(NodeStatus::Provisional, limit)
    }

    fn list_by_status(&self, status: NodeStatus, limit: usize) -> EngineResult<Vec<Node>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM nodes n WHERE n.status = ?1
             ORDER BY n.salience DESC, n.node_id ASC LIMIT ?2",
            NODE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![status.to_string(), limit as i64], Self::node_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_nodes(&self) -> EngineResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    /// Periodic forgetting: apply `decay` to up to `limit` active nodes
    /// (highest salience first). Returns how many nodes actually changed.
    pub fn decay_active_nodes(&self, limit: usize) -> EngineResult<usize> {
        let nodes = self.get_top_salience_nodes(limit)?;
        let mut changed = 0;
        for node in nodes {
            let decayed = weights::decay(node.weight);
            if decayed != node.weight {
                self.set_node_weight(&node.node_id, decayed)?;
                changed += 1;
            }
        }
        info!("[graph] Decay pass touched {} node(s)", changed);
        Ok(changed)
    }

    // ── Node row mapper (column order must match NODE_COLUMNS) ──

    pub(super) fn node_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
        let node_type_str: String = row.get(2)?;
        let node_type = node_type_str.parse::<NodeType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?;
        let status_str: String = row.get(3)?;
        let status = status_str.parse::<NodeStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?;

        let lat: Option<f64> = row.get(14)?;
        let lng: Option<f64> = row.get(15)?;
        let place: Option<String> = row.get(16)?;
        let spatial = if lat.is_some() || lng.is_some() || place.is_some() {
            Some(SpatialMeta { lat, lng, name: place })
        } else {
            None
        };
        let start: Option<String> = row.get(17)?;
        let end: Option<String> = row.get(18)?;
        let temporal = if start.is_some() || end.is_some() {
            Some(TemporalMeta { start, end })
        } else {
            None
        };

        Ok(Node {
            node_id: row.get(0)?,
            premise: row.get(1)?,
            node_type,
            status,
            weight: WeightVector {
                salience: row.get(4)?,
                valence: row.get(5)?,
                arousal: row.get(6)?,
                commitment: row.get(7)?,
                uncertainty: row.get(8)?,
                resonance: row.get(9)?,
            },
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            created_by: row.get(12)?,
            version: row.get(13)?,
            spatial,
            temporal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GraphStore {
        GraphStore::open_in_memory().unwrap()
    }

    #[test]
    fn corrupt_status_is_an_error() {
        let g = store();
        let id = g.create_node(NewNode::new("p", NodeType::Premise, "t")).unwrap();
        g.conn
            .lock()
            .execute(
                "UPDATE nodes SET status = 'bogus', version = version + 1 WHERE node_id = ?1",
                params![id],
            )
            .unwrap();
        assert!(matches!(
            g.get_node(&id),
            Err(EngineError::Database(rusqlite::Error::FromSqlConversionFailure(3, _, _)))
        ));
    }

    #[test]
    fn create_with_partial_weight_keeps_defaults() {
        let g = store();
        let id = g
            .create_node(
                NewNode::new("The user prefers tea", NodeType::Preference, "soul")
                    .with_weight(PartialWeight { salience: Some(0.9), ..Default::default() }),
            )
            .unwrap();
        let node = g.get_node(&id).unwrap().unwrap();
        assert_eq!(node.weight.salience, 0.9);
        let d = WeightVector::default();
        assert_eq!(node.weight.valence, d.valence);
        assert_eq!(node.weight.commitment, d.commitment);
        assert_eq!(node.weight.uncertainty, d.uncertainty);
        assert_eq!(node.version, 1);
        assert_eq!(node.status, NodeStatus::Active);
        assert_eq!(node.created_by, "soul");
    }

    #[test]
    fn ids_sort_in_insertion_order() {
        let g = store();
        let ids: Vec<String> = (0..20)
            .map(|i| g.create_node(NewNode::new(&format!("p{}", i), NodeType::Premise, "t")).unwrap())
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn blank_premise_rejected() {
        let g = store();
        let err = g.create_node(NewNode::new("   ", NodeType::Goal, "t")).unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[test]
    fn update_weight_clamps_and_bumps_version() {
        let g = store();
        let id = g.create_node(NewNode::new("p", NodeType::Premise, "t")).unwrap();
        let before = g.get_node(&id).unwrap().unwrap();
        let after = g
            .update_node_weight(&id, &PartialWeight { arousal: Some(3.0), valence: Some(-2.0), ..Default::default() })
            .unwrap();
        assert_eq!(after.weight.arousal, 1.0);
        assert_eq!(after.weight.valence, -1.0);
        assert_eq!(after.weight.salience, before.weight.salience);
        assert_eq!(after.version, 2);
        assert_eq!(g.get_node(&id).unwrap().unwrap(), after);
    }

    #[test]
    fn missing_node_update_is_not_found() {
        let g = store();
        let err = g.update_node_weight("nope", &PartialWeight::default()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
        assert!(g.update_node_status("nope", NodeStatus::Archived).is_err());
    }

    #[test]
    fn status_lists_are_salience_ordered() {
        let g = store();
        for (premise, s, status) in [
            ("low", 0.2, NodeStatus::Active),
            ("high", 0.9, NodeStatus::Active),
            ("tentative", 0.7, NodeStatus::Provisional),
            ("gone", 1.0, NodeStatus::Archived),
        ] {
            g.create_node(
                NewNode::new(premise, NodeType::Premise, "t")
                    .with_weight(PartialWeight { salience: Some(s), ..Default::default() })
                    .with_status(status),
            )
            .unwrap();
        }
        let top: Vec<_> = g.get_top_salience_nodes(10).unwrap().into_iter().map(|n| n.premise).collect();
        assert_eq!(top, vec!["high", "low"]);
        let prov = g.get_provisional_nodes(10).unwrap();
        assert_eq!(prov.len(), 1);
        assert_eq!(prov[0].premise, "tentative");
        assert_eq!(g.count_nodes().unwrap(), 4);
    }

    #[test]
    fn spatial_and_temporal_metadata_round_trip() {
        let g = store();
        let mut new = NewNode::new("Home is Lisbon", NodeType::Spatial, "t");
        new.spatial = Some(SpatialMeta { lat: Some(38.72), lng: Some(-9.14), name: Some("Lisbon".into()) });
        new.temporal = Some(TemporalMeta { start: Some("2024-01-01T00:00:00Z".into()), end: None });
        let id = g.create_node(new).unwrap();
        let node = g.get_node(&id).unwrap().unwrap();
        assert_eq!(node.spatial.unwrap().name.as_deref(), Some("Lisbon"));
        assert_eq!(node.temporal.unwrap().end, None);
    }

    #[test]
    fn decay_lowers_active_salience() {
        let g = store();
        let id = g.create_node(NewNode::new("p", NodeType::Premise, "t")).unwrap();
        assert_eq!(g.decay_active_nodes(10).unwrap(), 1);
        let node = g.get_node(&id).unwrap().unwrap();
        assert!((node.weight.salience - 0.49).abs() < 1e-9);
    }
}
