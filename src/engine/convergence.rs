// ── Convergence ─────────────────────────────────────────────────────────────
//
// Promote provisional beliefs that have settled: commitment at or above the
// threshold and uncertainty at or below its complement. Promotion only ever
// goes provisional → active; demotion is the compiler's job (contradict).

use crate::atoms::error::EngineResult;
use crate::atoms::soul_types::{ConvergenceReport, NodeStatus};
use crate::engine::config::SoulConfig;
use crate::engine::graph::GraphStore;
use crate::engine::weights::snap;
use log::{debug, info};

pub struct ConvergenceAnalyzer<'a> {
    graph: &'a GraphStore,
    threshold: f64,
    /// `1 - threshold` on the weight grid, so 1 - 0.8 compares as 0.2.
    uncertainty_ceiling: f64,
    scan_limit: usize,
}

impl<'a> ConvergenceAnalyzer<'a> {
    pub fn new(graph: &'a GraphStore, threshold: f64, scan_limit: usize) -> Self {
        let threshold = threshold.clamp(0.0, 1.0);
        Self {
            graph,
            threshold,
            uncertainty_ceiling: snap(1.0 - threshold),
            scan_limit,
        }
    }

    pub fn from_config(graph: &'a GraphStore, config: &SoulConfig) -> Self {
        Self::new(graph, config.convergence_threshold, config.convergence_scan_limit)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn has_converged(&self, commitment: f64, uncertainty: f64) -> bool {
        commitment >= self.threshold && uncertainty <= self.uncertainty_ceiling
    }

    /// One pass over up to `scan_limit` provisional nodes, salience first.
    pub fn analyze(&self) -> EngineResult<ConvergenceReport> {
        let candidates = self.graph.get_provisional_nodes(self.scan_limit)?;
        let scanned = candidates.len();
        let mut report = ConvergenceReport::default();

        for node in candidates {
            if !self.has_converged(node.weight.commitment, node.weight.uncertainty) {
                continue;
            }
            self.graph.update_node_status(&node.node_id, NodeStatus::Active)?;
            debug!(
                "[convergence] {} settled (commitment {:.3}, uncertainty {:.3})",
                node.node_id, node.weight.commitment, node.weight.uncertainty
            );
            report.promoted_node_ids.push(node.node_id);
        }
        report.promoted_count = report.promoted_node_ids.len();

        info!(
            "[convergence] Promoted {}/{} provisional node(s) at threshold {}",
            report.promoted_count, scanned, self.threshold
        );
        Ok(report)
    }
}
