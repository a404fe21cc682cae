// Soul Compiler — the only write path from model output into the graph.
//
// Pipeline for one proposal:
//   validate → contradict → add (provisional) → reinforce → edges
//   → evidence + resonance → capsule → promotion → checkpoint → backup
//
// Validation is all-or-nothing. After that, steps are sequential durable
// writes: an edge naming a missing node aborts the remaining steps but what
// came before stays applied, and no checkpoint is issued for that call.
//
// Module layout:
//   validate  — pure schema check over a Proposal
//   proposal  — `<proposal>` block extraction from model text
//   capsule   — deterministic capsule rendering
//   backup    — BackupWriter hook + filesystem snapshots

pub mod backup;
mod capsule;
mod proposal;
mod validate;

pub use capsule::render_capsule;
pub use proposal::{extract_proposal, strip_proposals};
pub use validate::validate_proposal;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::soul_types::{
    Capsule, CompileReport, LinkType, NewCheckpoint, NewNode, NodeStatus, NodeType, Proposal,
    Relation,
};
use crate::engine::config::SoulConfig;
use crate::engine::graph::GraphStore;
use crate::engine::paths::StoragePaths;
use crate::engine::weights;
use backup::{BackupWriter, FsBackupWriter};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;

pub struct Compiler<'a> {
    graph: &'a GraphStore,
    paths: StoragePaths,
    config: SoulConfig,
    backup: Option<Arc<dyn BackupWriter>>,
}

impl<'a> Compiler<'a> {
    /// Compiler over `graph`, writing the capsule (and backups, when
    /// `config.backups_enabled`) under `paths`.
    pub fn new(graph: &'a GraphStore, paths: StoragePaths, config: SoulConfig) -> Self {
        let backup: Option<Arc<dyn BackupWriter>> = if config.backups_enabled {
            Some(Arc::new(FsBackupWriter))
        } else {
            None
        };
        Self { graph, paths, config, backup }
    }

    /// Replace the backup hook (`None` disables backups).
    pub fn with_backup_writer(mut self, writer: Option<Arc<dyn BackupWriter>>) -> Self {
        self.backup = writer;
        self
    }

    pub fn compile(&self, proposal: &Proposal, actor_id: &str) -> EngineResult<CompileReport> {
        self.compile_with_evidence(proposal, actor_id, None)
    }

    /// Compile and link every touched node to `evidence_hash`: created nodes
    /// as `origin`, reinforced as `supports`, contradicted as `contradicts`.
    pub fn compile_with_evidence(
        &self,
        proposal: &Proposal,
        actor_id: &str,
        evidence_hash: Option<&str>,
    ) -> EngineResult<CompileReport> {
        let errors = validate_proposal(proposal);
        if !errors.is_empty() {
            warn!("[compiler] Rejected proposal from {}: {} error(s)", actor_id, errors.len());
            return Err(EngineError::validation(errors));
        }

        let mut report = CompileReport::default();
        let mut touched: Vec<String> = Vec::new();

        // ── Contradict ─────────────────────────────────────────────────
        for id in &proposal.contradict {
            let Some(node) = self.graph.get_node(id)? else {
                warn!("[compiler] contradict: unknown node {}, skipped", id);
                report.skipped_ids.push(id.clone());
                continue;
            };
            self.graph.set_node_weight(id, weights::contradict(node.weight))?;
            if node.status == NodeStatus::Active {
                self.graph.update_node_status(id, NodeStatus::Provisional)?;
            }
            self.link(id, evidence_hash, LinkType::Contradicts)?;
            report.contradicted.push(id.clone());
            touched.push(id.clone());
        }

        // ── Add ────────────────────────────────────────────────────────
        for item in &proposal.add {
            let node_type: NodeType = item
                .node_type
                .parse()
                .map_err(|e: String| EngineError::validation(vec![e]))?;
            let id = self.graph.create_node(NewNode {
                premise: item.premise.trim().to_string(),
                node_type,
                weight: item.weight,
                created_by: actor_id.to_string(),
                status: NodeStatus::Provisional,
                spatial: item.spatial.clone(),
                temporal: item.temporal.clone(),
            })?;
            self.link(&id, evidence_hash, LinkType::Origin)?;
            report.created.push(id.clone());
            touched.push(id);
        }

        // ── Reinforce ──────────────────────────────────────────────────
        for id in &proposal.reinforce {
            let Some(node) = self.graph.get_node(id)? else {
                warn!("[compiler] reinforce: unknown node {}, skipped", id);
                report.skipped_ids.push(id.clone());
                continue;
            };
            self.graph.set_node_weight(id, weights::reinforce(node.weight))?;
            self.link(id, evidence_hash, LinkType::Supports)?;
            report.reinforced.push(id.clone());
            touched.push(id.clone());
        }

        // ── Edges ──────────────────────────────────────────────────────
        for (index, item) in proposal.edges.iter().enumerate() {
            let relation: Relation = item
                .relation
                .parse()
                .map_err(|e: String| EngineError::validation(vec![e]))?;
            let (edge_id, changed) = {
                let conn = self.graph.conn.lock();
                GraphStore::create_edge_locked(
                    &conn,
                    index,
                    &item.source,
                    &item.target,
                    relation,
                    item.strength,
                )?
            };
            if changed {
                report.edges_created.push(edge_id);
                touched.push(item.source.clone());
                touched.push(item.target.clone());
            }
        }

        report.changed = !report.contradicted.is_empty()
            || !report.created.is_empty()
            || !report.reinforced.is_empty()
            || !report.edges_created.is_empty();

        if !report.changed {
            info!("[compiler] No-op proposal from {}, no checkpoint", actor_id);
            return Ok(report);
        }

        self.refresh_resonance(&touched)?;

        // ── Capsule + promotion ────────────────────────────────────────
        let previous: HashSet<String> = self
            .graph
            .latest_checkpoint()?
            .map(|cp| cp.capsule_node_ids.into_iter().collect())
            .unwrap_or_default();

        let mut capsule = self.render()?;
        let entering: Vec<String> = capsule
            .node_ids
            .iter()
            .filter(|id| !previous.contains(*id))
            .cloned()
            .collect();
        if !entering.is_empty() {
            for id in &entering {
                if let Some(node) = self.graph.get_node(id)? {
                    self.graph.set_node_weight(id, weights::capsule_promotion(node.weight))?;
                }
            }
            debug!("[compiler] {} node(s) entered the capsule", entering.len());
            capsule = self.render()?;
        }
        self.write_capsule(&capsule)?;

        // ── Checkpoint ─────────────────────────────────────────────────
        let checkpoint = self.graph.create_checkpoint(NewCheckpoint {
            capsule_hash: capsule.hash.clone(),
            actor_id: actor_id.to_string(),
            capsule_node_ids: capsule.node_ids.clone(),
        })?;

        // ── Backup ─────────────────────────────────────────────────────
        // The checkpoint is already durable; a failed snapshot is reported
        // on the result, not returned as an error.
        if let Some(ref writer) = self.backup {
            let result = self
                .graph
                .flush_wal()
                .and_then(|_| writer.write(self.paths.root(), &checkpoint, actor_id));
            match result {
                Ok(location) => {
                    report.backup_location = location.map(|p| p.display().to_string())
                }
                Err(e) => {
                    warn!("[compiler] Backup for v{} failed: {}", checkpoint.version, e);
                    report.backup_error = Some(e.to_string());
                }
            }
        }

        info!(
            "[compiler] ✓ v{}: +{} node(s), {} reinforced, {} contradicted, {} edge(s), {} skipped",
            checkpoint.version,
            report.created.len(),
            report.reinforced.len(),
            report.contradicted.len(),
            report.edges_created.len(),
            report.skipped_ids.len()
        );
        report.checkpoint = Some(checkpoint);
        report.capsule = Some(capsule);
        Ok(report)
    }

    /// Render the capsule from the current graph without writing anything.
    pub fn render(&self) -> EngineResult<Capsule> {
        let nodes = self.graph.get_top_salience_nodes(self.config.capsule_max_nodes)?;
        Ok(render_capsule(&nodes, self.config.capsule_char_budget))
    }

    /// Current capsule text: the file when one was written, else a fresh render.
    pub fn read_capsule(&self) -> EngineResult<String> {
        let file = self.paths.capsule_file();
        if file.is_file() {
            return Ok(std::fs::read_to_string(file)?);
        }
        Ok(self.render()?.text)
    }

    fn write_capsule(&self, capsule: &Capsule) -> EngineResult<()> {
        std::fs::create_dir_all(self.paths.root())?;
        std::fs::write(self.paths.capsule_file(), &capsule.text)?;
        Ok(())
    }

    fn link(&self, node_id: &str, evidence_hash: Option<&str>, link: LinkType) -> EngineResult<()> {
        if let Some(hash) = evidence_hash {
            self.graph.add_evidence(node_id, hash, link)?;
        }
        Ok(())
    }

    fn refresh_resonance(&self, touched: &[String]) -> EngineResult<()> {
        let mut seen = HashSet::new();
        for id in touched {
            if !seen.insert(id.as_str()) {
                continue;
            }
            let Some(node) = self.graph.get_node(id)? else {
                continue;
            };
            let neighbors = self.graph.neighbor_salience(id)?;
            let updated = weights::update_resonance(node.weight, &neighbors);
            if updated != node.weight {
                self.graph.set_node_weight(id, updated)?;
            }
        }
        Ok(())
    }
}
