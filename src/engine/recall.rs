// ── Recall ─────────────────────────────────────────────────────────────────
//
// Rebuild conversational context from the two stores:
//
//   chronological  latest N events (optionally one agent's), or every event
//                  inside a time window when one is given
//   semantic       premise search over the graph → evidence links → events,
//                  newest first, capped
//
// Both paths are merged by event hash and returned in (timestamp, hash)
// order, so the same stores and query always give the same list.

use crate::atoms::error::EngineResult;
use crate::atoms::soul_types::Event;
use crate::engine::archive::ArchiveStore;
use crate::engine::config::SoulConfig;
use crate::engine::graph::GraphStore;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct RecallOptions {
    /// Chronological window size.
    pub recent_limit: usize,
    /// Restrict the chronological path to one agent.
    pub agent_id: Option<String>,
    /// Replace the chronological window with every event in this range.
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub semantic_node_limit: usize,
    pub semantic_event_limit: usize,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self::from_config(&SoulConfig::default())
    }
}

impl RecallOptions {
    pub fn from_config(config: &SoulConfig) -> Self {
        Self {
            recent_limit: config.recall_recent_limit,
            agent_id: None,
            time_range: None,
            semantic_node_limit: config.recall_semantic_nodes,
            semantic_event_limit: config.recall_semantic_events,
        }
    }

    pub fn for_agent(mut self, agent_id: &str) -> Self {
        self.agent_id = Some(agent_id.to_string());
        self
    }

    pub fn within(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.time_range = Some((start, end));
        self
    }
}

pub fn recall(
    archive: &ArchiveStore,
    graph: &GraphStore,
    query: &str,
    options: &RecallOptions,
) -> EngineResult<Vec<Event>> {
    let chronological = match (&options.time_range, &options.agent_id) {
        (Some((start, end)), _) => archive.get_events_by_time_range(start, end)?,
        (None, Some(agent)) => archive.get_recent_events_for_agent(agent, options.recent_limit)?,
        (None, None) => archive.get_recent_events(options.recent_limit)?,
    };

    let semantic = if query.trim().is_empty() {
        Vec::new()
    } else {
        semantic_events(archive, graph, query, options)?
    };
    let semantic_count = semantic.len();

    let mut merged: HashMap<String, Event> = HashMap::new();
    for event in semantic.into_iter().chain(chronological) {
        merged.insert(event.event_hash.clone(), event);
    }

    let mut events: Vec<Event> = merged.into_values().collect();
    events.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.event_hash.cmp(&b.event_hash))
    });

    info!(
        "[recall] {} event(s) ({} from graph evidence)",
        events.len(),
        semantic_count
    );
    Ok(events)
}

fn semantic_events(
    archive: &ArchiveStore,
    graph: &GraphStore,
    query: &str,
    options: &RecallOptions,
) -> EngineResult<Vec<Event>> {
    let hits = graph.search_nodes(query, options.semantic_node_limit)?;

    let mut hashes = HashSet::new();
    for (node, _score) in &hits {
        for link in graph.get_evidence(&node.node_id)? {
            hashes.insert(link.event_hash);
        }
    }

    let mut events = Vec::with_capacity(hashes.len());
    for hash in hashes {
        match archive.get_event_by_hash(&hash)? {
            Some(event) => events.push(event),
            None => debug!("[recall] Evidence {} not in archive", hash),
        }
    }

    events.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.event_hash.cmp(&a.event_hash))
    });
    events.truncate(options.semantic_event_limit);
    debug!(
        "[recall] Query {:?}: {} node hit(s) → {} event(s)",
        query,
        hits.len(),
        events.len()
    );
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::soul_types::{EventRecord, EventType, LinkType, NewNode, NodeType};
    use serde_json::json;

    fn say(archive: &ArchiveStore, agent: &str, text: &str, ts: &str) -> Event {
        archive
            .append_to_session(
                EventRecord::new("s1", EventType::Message, agent)
                    .with_payload(json!({ "text": text }))
                    .at(ts),
            )
            .unwrap()
    }

    fn stores() -> (ArchiveStore, GraphStore) {
        (ArchiveStore::open_in_memory().unwrap(), GraphStore::open_in_memory().unwrap())
    }

    #[test]
    fn chronological_only_without_query() {
        let (archive, graph) = stores();
        for i in 0..5 {
            say(&archive, "soul", &format!("m{}", i), &format!("2025-01-01T00:00:0{}Z", i));
        }
        let opts = RecallOptions { recent_limit: 3, ..Default::default() };
        let events = recall(&archive, &graph, "  ", &opts).unwrap();
        let texts: Vec<_> = events.iter().map(|e| e.payload["text"].clone()).collect();
        assert_eq!(texts, vec![json!("m2"), json!("m3"), json!("m4")]);
    }

    #[test]
    fn semantic_hits_pull_in_old_evidence() {
        let (archive, graph) = stores();
        let old = say(&archive, "user", "I love green tea", "2024-01-01T00:00:00Z");
        for i in 0..5 {
            say(&archive, "user", &format!("filler {}", i), &format!("2025-01-01T00:00:0{}Z", i));
        }
        let node = graph
            .create_node(NewNode::new("User loves green tea", NodeType::Preference, "soul"))
            .unwrap();
        graph.add_evidence(&node, &old.event_hash, LinkType::Origin).unwrap();

        let opts = RecallOptions { recent_limit: 2, ..Default::default() };
        let events = recall(&archive, &graph, "tea", &opts).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_hash, old.event_hash);
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn overlap_is_deduplicated_and_deterministic() {
        let (archive, graph) = stores();
        let e = say(&archive, "user", "remember Lisbon", "2025-02-01T00:00:00Z");
        let node = graph.create_node(NewNode::new("Lives in Lisbon", NodeType::Spatial, "soul")).unwrap();
        graph.add_evidence(&node, &e.event_hash, LinkType::Origin).unwrap();

        let opts = RecallOptions::default();
        let first = recall(&archive, &graph, "lisbon", &opts).unwrap();
        let second = recall(&archive, &graph, "lisbon", &opts).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn agent_filter_and_time_range() {
        let (archive, graph) = stores();
        say(&archive, "user", "a", "2025-01-01T00:00:00Z");
        say(&archive, "soul", "b", "2025-01-02T00:00:00Z");
        say(&archive, "user", "c", "2025-01-03T00:00:00Z");

        let by_agent = recall(&archive, &graph, "", &RecallOptions::default().for_agent("soul")).unwrap();
        assert_eq!(by_agent.len(), 1);
        assert_eq!(by_agent[0].agent_id, "soul");

        let start = "2025-01-02T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let end = "2025-01-03T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let ranged = recall(&archive, &graph, "", &RecallOptions::default().within(start, end)).unwrap();
        assert_eq!(ranged.len(), 2);
    }

    #[test]
    fn dangling_evidence_is_ignored() {
        let (archive, graph) = stores();
        let node = graph.create_node(NewNode::new("orphan memory", NodeType::Premise, "soul")).unwrap();
        graph.add_evidence(&node, "deadbeef", LinkType::Origin).unwrap();
        assert!(recall(&archive, &graph, "orphan", &RecallOptions::default()).unwrap().is_empty());
    }
}
