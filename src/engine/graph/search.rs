// ── Graph: Premise Search ──────────────────────────────────────────────────
//
// FTS5 over node premises, ranked by BM25. User text never reaches MATCH
// raw: it is sanitized, then each token is quoted and OR-joined so any word
// can hit.

use super::nodes::NODE_COLUMNS;
use super::GraphStore;
use crate::atoms::error::EngineResult;
use crate::atoms::soul_types::{Node, NodeStatus};
use log::{debug, info};
use rusqlite::params;

/// Strip FTS5 operators and syntax characters from free text.
pub fn sanitize_fts5_query(query: &str) -> String {
    let mut sanitized = String::with_capacity(query.len());
    for c in query.chars() {
        match c {
            '"' | '*' | '+' | '-' | '^' | ':' | '(' | ')' | '{' | '}' | '.' | ',' | ';'
            | '?' | '!' | '\'' => sanitized.push(' '),
            _ => sanitized.push(c),
        }
    }
    sanitized
        .split_whitespace()
        .filter(|t| !matches!(*t, "NEAR" | "AND" | "OR" | "NOT"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote every sanitized token and OR them together.
fn match_expression(query: &str) -> Option<String> {
    let sanitized = sanitize_fts5_query(query);
    if sanitized.is_empty() {
        return None;
    }
    Some(
        sanitized
            .split(' ')
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

impl GraphStore {
    /// Non-archived nodes whose premise matches `query`, best first.
    /// The score is the negated BM25 rank (higher is better).
    pub fn search_nodes(&self, query: &str, limit: usize) -> EngineResult<Vec<(Node, f64)>> {
        let Some(expr) = match_expression(query) else {
            return Ok(Vec::new());
        };
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {}, bm25(nodes_fts) AS score
             FROM nodes_fts
             JOIN nodes n ON n.rowid = nodes_fts.rowid
             WHERE nodes_fts MATCH ?1 AND n.status != ?2
             ORDER BY score ASC, n.node_id ASC
             LIMIT ?3",
            NODE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let hits = stmt
            .query_map(
                params![expr, NodeStatus::Archived.to_string(), limit as i64],
                |row| {
                    let node = Self::node_from_row(row)?;
                    let rank: f64 = row.get(19)?;
                    Ok((node, -rank))
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!("[graph] Search {:?} → {} hit(s)", query, hits.len());
        Ok(hits)
    }

    /// Merge FTS segments and refresh planner statistics.
    pub fn optimize(&self) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute("INSERT INTO nodes_fts(nodes_fts) VALUES ('optimize')", [])?;
        conn.execute_batch("PRAGMA optimize;")?;
        info!("[graph] FTS index optimized");
        Ok(())
    }
}
