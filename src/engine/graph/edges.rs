// ── Graph: Edges & Evidence Links ───────────────────────────────────────────

use super::GraphStore;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::soul_types::{Edge, EvidenceLink, LinkType, NodeStatus, Relation};
use crate::engine::now_timestamp;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

const DEFAULT_EDGE_STRENGTH: f64 = 0.5;

const EDGE_COLUMNS: &str = "edge_id, source_id, target_id, relation, strength, created_at";

impl GraphStore {
    /// Link two existing nodes. Re-adding an existing (source, target,
    /// relation) triple returns the existing edge id, updating its strength
    /// when one is supplied.
    pub fn create_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relation: Relation,
        strength: Option<f64>,
    ) -> EngineResult<String> {
        let conn = self.conn.lock();
        let (id, _) = Self::create_edge_locked(&conn, 0, source_id, target_id, relation, strength)?;
        Ok(id)
    }

    /// Returns the edge id and whether the graph changed.
    pub(crate) fn create_edge_locked(
        conn: &Connection,
        index: usize,
        source_id: &str,
        target_id: &str,
        relation: Relation,
        strength: Option<f64>,
    ) -> EngineResult<(String, bool)> {
        for endpoint in [source_id, target_id] {
            if !Self::node_exists_locked(conn, endpoint)? {
                return Err(EngineError::EdgeEndpoint {
                    index,
                    source_id: source_id.to_string(),
                    target_id: target_id.to_string(),
                    missing_id: endpoint.to_string(),
                });
            }
        }
        if let Some(s) = strength {
            if !s.is_finite() {
                return Err(EngineError::InvalidWeight(format!("non-finite edge strength {}", s)));
            }
        }

        let existing: Option<(String, f64)> = conn
            .query_row(
                "SELECT edge_id, strength FROM edges
                 WHERE source_id = ?1 AND target_id = ?2 AND relation = ?3",
                params![source_id, target_id, relation.to_string()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        if let Some((edge_id, current)) = existing {
            return match strength.map(|s| s.clamp(0.0, 1.0)) {
                Some(s) if s != current => {
                    conn.execute(
                        "UPDATE edges SET strength = ?2 WHERE edge_id = ?1",
                        params![edge_id, s],
                    )?;
                    debug!("[graph] Edge {} strength {} → {}", edge_id, current, s);
                    Ok((edge_id, true))
                }
                _ => Ok((edge_id, false)),
            };
        }

        let edge_id = uuid::Uuid::new_v4().to_string();
        let strength = strength.unwrap_or(DEFAULT_EDGE_STRENGTH).clamp(0.0, 1.0);
        conn.execute(
            "INSERT INTO edges (edge_id, source_id, target_id, relation, strength, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![edge_id, source_id, target_id, relation.to_string(), strength, now_timestamp()],
        )?;
        info!("[graph] ✓ Edge {} -[{}]-> {}", source_id, relation, target_id);
        Ok((edge_id, true))
    }

    pub fn find_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relation: Relation,
    ) -> EngineResult<Option<Edge>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM edges WHERE source_id = ?1 AND target_id = ?2 AND relation = ?3",
            EDGE_COLUMNS
        );
        let edge = conn
            .query_row(&sql, params![source_id, target_id, relation.to_string()], edge_from_row)
            .optional()?;
        Ok(edge)
    }

    /// Every edge touching `node_id`, as source or target.
    pub fn get_edges(&self, node_id: &str) -> EngineResult<Vec<Edge>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM edges WHERE source_id = ?1 OR target_id = ?1
             ORDER BY created_at ASC, edge_id ASC",
            EDGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let edges = stmt
            .query_map(params![node_id], edge_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    /// Edges whose source AND target are both in `node_ids`.
    pub fn get_edges_for_nodes(&self, node_ids: &[String]) -> EngineResult<Vec<Edge>> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (1..=node_ids.len()).map(|i| format!("?{}", i)).collect();
        let list = placeholders.join(",");
        let sql = format!(
            "SELECT {} FROM edges WHERE source_id IN ({list}) AND target_id IN ({list})
             ORDER BY created_at ASC, edge_id ASC",
            EDGE_COLUMNS,
            list = list
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let edges = stmt
            .query_map(rusqlite::params_from_iter(node_ids.iter()), edge_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    pub fn count_edges(&self) -> EngineResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    /// Salience of every non-archived node adjacent to `node_id`.
    pub fn neighbor_salience(&self, node_id: &str) -> EngineResult<Vec<f64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT n.salience FROM edges e
             JOIN nodes n ON n.node_id = CASE WHEN e.source_id = ?1 THEN e.target_id ELSE e.source_id END
             WHERE (e.source_id = ?1 OR e.target_id = ?1)
               AND n.node_id != ?1
               AND n.status != ?2",
        )?;
        let values = stmt
            .query_map(params![node_id, NodeStatus::Archived.to_string()], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<f64>>>()?;
        Ok(values)
    }

    // ── Evidence ───────────────────────────────────────────────────────

    /// Attach an archive event to a node. Returns false when the identical
    /// link already exists.
    pub fn add_evidence(
        &self,
        node_id: &str,
        event_hash: &str,
        link_type: LinkType,
    ) -> EngineResult<bool> {
        let conn = self.conn.lock();
        Self::add_evidence_locked(&conn, node_id, event_hash, link_type)
    }

    pub(crate) fn add_evidence_locked(
        conn: &Connection,
        node_id: &str,
        event_hash: &str,
        link_type: LinkType,
    ) -> EngineResult<bool> {
        if !Self::node_exists_locked(conn, node_id)? {
            return Err(EngineError::node_not_found(node_id));
        }
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO evidence_links (node_id, event_hash, link_type, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![node_id, event_hash, link_type.to_string(), now_timestamp()],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_evidence(&self, node_id: &str) -> EngineResult<Vec<EvidenceLink>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT node_id, event_hash, link_type, created_at FROM evidence_links
             WHERE node_id = ?1 ORDER BY created_at ASC, event_hash ASC",
        )?;
        let links = stmt
            .query_map(params![node_id], |row| {
                let link_type: String = row.get(2)?;
                Ok(EvidenceLink {
                    node_id: row.get(0)?,
                    event_hash: row.get(1)?,
                    link_type: link_type.parse().map_err(|e: String| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            rusqlite::types::Type::Text,
                            e.into(),
                        )
                    })?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(links)
    }
}

fn edge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Edge> {
    let relation: String = row.get(3)?;
    Ok(Edge {
        edge_id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        relation: relation.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?,
        strength: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::soul_types::{NewNode, NodeType, PartialWeight};

    fn graph_with(n: usize) -> (GraphStore, Vec<String>) {
        let g = GraphStore::open_in_memory().unwrap();
        let ids = (0..n)
            .map(|i| {
                g.create_node(NewNode::new(&format!("node {}", i), NodeType::Premise, "t"))
                    .unwrap()
            })
            .collect();
        (g, ids)
    }

    #[test]
    fn edge_defaults_and_lookup() {
        let (g, ids) = graph_with(2);
        let edge_id = g.create_edge(&ids[0], &ids[1], Relation::Supports, None).unwrap();
        let edge = g.find_edge(&ids[0], &ids[1], Relation::Supports).unwrap().unwrap();
        assert_eq!(edge.edge_id, edge_id);
        assert_eq!(edge.strength, 0.5);
        assert_eq!(g.get_edges(&ids[1]).unwrap().len(), 1);
        assert!(g.find_edge(&ids[1], &ids[0], Relation::Supports).unwrap().is_none());
    }

    #[test]
    fn missing_endpoint_names_the_missing_id() {
        let (g, ids) = graph_with(1);
        let err = g.create_edge(&ids[0], "ghost", Relation::RelatedTo, None).unwrap_err();
        match err {
            EngineError::EdgeEndpoint { missing_id, index, .. } => {
                assert_eq!(missing_id, "ghost");
                assert_eq!(index, 0);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(g.count_edges().unwrap(), 0);
    }

    #[test]
    fn duplicate_triple_reuses_edge() {
        let (g, ids) = graph_with(2);
        let first = g.create_edge(&ids[0], &ids[1], Relation::Refines, Some(0.3)).unwrap();
        let second = g.create_edge(&ids[0], &ids[1], Relation::Refines, Some(0.8)).unwrap();
        assert_eq!(first, second);
        assert_eq!(g.count_edges().unwrap(), 1);
        let edge = g.find_edge(&ids[0], &ids[1], Relation::Refines).unwrap().unwrap();
        assert_eq!(edge.strength, 0.8);
    }

    #[test]
    fn edges_for_nodes_requires_both_endpoints() {
        let (g, ids) = graph_with(3);
        g.create_edge(&ids[0], &ids[1], Relation::Supports, None).unwrap();
        g.create_edge(&ids[1], &ids[2], Relation::DependsOn, None).unwrap();
        let subset = vec![ids[0].clone(), ids[1].clone()];
        let edges = g.get_edges_for_nodes(&subset).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_id, ids[1]);
        assert!(g.get_edges_for_nodes(&[]).unwrap().is_empty());
    }

    #[test]
    fn neighbor_salience_skips_archived() {
        let (g, ids) = graph_with(3);
        g.update_node_weight(&ids[1], &PartialWeight { salience: Some(0.9), ..Default::default() })
            .unwrap();
        g.update_node_status(&ids[2], NodeStatus::Archived).unwrap();
        g.create_edge(&ids[0], &ids[1], Relation::Supports, None).unwrap();
        g.create_edge(&ids[2], &ids[0], Relation::Supports, None).unwrap();
        assert_eq!(g.neighbor_salience(&ids[0]).unwrap(), vec![0.9]);
    }

    #[test]
    fn evidence_is_unique_per_link() {
        let (g, ids) = graph_with(1);
        assert!(g.add_evidence(&ids[0], "abc", LinkType::Origin).unwrap());
        assert!(!g.add_evidence(&ids[0], "abc", LinkType::Origin).unwrap());
        assert!(g.add_evidence(&ids[0], "abc", LinkType::Supports).unwrap());
        let links = g.get_evidence(&ids[0]).unwrap();
        assert_eq!(links.len(), 2);
        assert!(g.add_evidence("ghost", "abc", LinkType::Origin).is_err());
    }
}
