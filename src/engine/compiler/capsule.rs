// ── Compiler: Capsule Rendering ─────────────────────────────────────────────
//
// Layout:
//   # Soul Capsule
//
//   ## Identity
//   - {premise} ({salience:.2})
//   …
//
// Sections follow NodeType declaration order; empty sections are omitted.
// Within a section, entries keep the caller's order (salience descending).
// The budget is counted in chars and includes the truncation marker.

use crate::atoms::constants::{CAPSULE_HEADER, CAPSULE_TRUNCATION_MARKER};
use crate::atoms::soul_types::{Capsule, Node, NodeType};
use crate::engine::sha256_hex;
use std::collections::HashSet;

/// Render `nodes` (already ordered by salience descending).
pub fn render_capsule(nodes: &[Node], char_budget: usize) -> Capsule {
    let mut text = String::new();
    text.push_str(CAPSULE_HEADER);
    text.push('\n');

    // (node_id, char offset where its entry line ends)
    let mut entry_ends: Vec<(&str, usize)> = Vec::with_capacity(nodes.len());
    let mut len = text.chars().count();

    for node_type in NodeType::ALL {
        let mut section = nodes.iter().filter(|n| n.node_type == node_type).peekable();
        if section.peek().is_none() {
            continue;
        }
        let heading = format!("\n## {}\n", node_type.heading());
        len += heading.chars().count();
        text.push_str(&heading);
        for node in section {
            let line = format!("- {} ({:.2})\n", node.premise, node.weight.salience);
            len += line.chars().count();
            text.push_str(&line);
            entry_ends.push((node.node_id.as_str(), len));
        }
    }

    let (text, included, truncated) = if len <= char_budget {
        let ids: HashSet<&str> = entry_ends.iter().map(|(id, _)| *id).collect();
        (text, ids, false)
    } else {
        let marker_len = CAPSULE_TRUNCATION_MARKER.chars().count();
        let keep = char_budget.saturating_sub(marker_len);
        let mut out: String = text.chars().take(keep).collect();
        out.push_str(CAPSULE_TRUNCATION_MARKER);
        let out: String = out.chars().take(char_budget).collect();
        let ids: HashSet<&str> = entry_ends
            .iter()
            .filter(|(_, end)| *end <= keep)
            .map(|(id, _)| *id)
            .collect();
        (out, ids, true)
    };

    let node_ids = nodes
        .iter()
        .filter(|n| included.contains(n.node_id.as_str()))
        .map(|n| n.node_id.clone())
        .collect();

    Capsule {
        hash: sha256_hex(text.as_bytes()),
        text,
        node_ids,
        truncated,
    }
}
