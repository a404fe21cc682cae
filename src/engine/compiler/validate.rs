// ── Compiler: Proposal Validation ───────────────────────────────────────────
//
// Pure schema check. Every message is prefixed with the JSON path of the
// offending element so a rejected batch can be fed back to the mind as-is.
// References to nodes are NOT checked here: that needs the graph, and an
// unknown reinforce/contradict id is skipped rather than rejected.

use crate::atoms::soul_types::{NodeType, PartialWeight, Proposal, Relation};

/// All schema errors in `proposal`. Empty means valid.
pub fn validate_proposal(proposal: &Proposal) -> Vec<String> {
    let mut errors = Vec::new();

    for (i, node) in proposal.add.iter().enumerate() {
        if node.premise.trim().is_empty() {
            errors.push(format!("add[{}]: premise must not be blank", i));
        }
        if node.node_type.parse::<NodeType>().is_err() {
            errors.push(format!("add[{}]: unknown node type {:?}", i, node.node_type));
        }
        check_weight(&mut errors, i, &node.weight);
        if let Some(ref spatial) = node.spatial {
            if let Some(lat) = spatial.lat {
                if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
                    errors.push(format!("add[{}]: spatial.lat {} outside [-90, 90]", i, lat));
                }
            }
            if let Some(lng) = spatial.lng {
                if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
                    errors.push(format!("add[{}]: spatial.lng {} outside [-180, 180]", i, lng));
                }
            }
        }
    }

    for (field, ids) in [("reinforce", &proposal.reinforce), ("contradict", &proposal.contradict)] {
        for (i, id) in ids.iter().enumerate() {
            if id.trim().is_empty() {
                errors.push(format!("{}[{}]: node id must not be blank", field, i));
            }
        }
    }

    for (i, edge) in proposal.edges.iter().enumerate() {
        if edge.source.trim().is_empty() {
            errors.push(format!("edges[{}]: source must not be blank", i));
        }
        if edge.target.trim().is_empty() {
            errors.push(format!("edges[{}]: target must not be blank", i));
        }
        if edge.relation.parse::<Relation>().is_err() {
            errors.push(format!("edges[{}]: unknown relation {:?}", i, edge.relation));
        }
        if let Some(s) = edge.strength {
            if !s.is_finite() {
                errors.push(format!("edges[{}]: strength is not finite", i));
            }
        }
    }

    errors
}

fn check_weight(errors: &mut Vec<String>, index: usize, weight: &PartialWeight) {
    for field in weight.non_finite_fields() {
        errors.push(format!("add[{}]: weight.{} is not finite", index, field));
    }
}
