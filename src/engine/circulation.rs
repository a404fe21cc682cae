// ── Circulation ─────────────────────────────────────────────────────────────
//
// One conversational turn, end to end:
//
//   inbound message → archive
//   recall (capsule + node index + merged history) → prompt
//   Mind::think(prompt)                      ← the only await point
//   reply → archive
//   <proposal> block → archive → compile (evidence: the inbound message)
//   commit (or system_notice on rejection) → archive
//   convergence pass
//
// The mind is injected; this module knows nothing about model providers.

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::soul_types::{
    CompileReport, ConvergenceReport, Event, EventRecord, EventType, Node, Proposal,
};
use crate::engine::archive::ArchiveStore;
use crate::engine::compiler::backup::{BackupWriter, FsBackupWriter};
use crate::engine::compiler::{extract_proposal, Compiler};
use crate::engine::config::SoulConfig;
use crate::engine::convergence::ConvergenceAnalyzer;
use crate::engine::graph::GraphStore;
use crate::engine::paths::StoragePaths;
use crate::engine::recall::{recall, RecallOptions};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// A stateless text-in / text-out model.
#[async_trait]
pub trait Mind: Send + Sync {
    async fn think(&self, prompt: &str) -> EngineResult<String>;
}

/// Archive payloads written by a turn, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnPayload {
    Inbound {
        text: String,
    },
    Reply {
        text: String,
    },
    Proposal {
        proposal: Proposal,
    },
    Commit {
        checkpoint_id: String,
        version: i64,
        capsule_hash: String,
        created: Vec<String>,
        reinforced: Vec<String>,
        contradicted: Vec<String>,
        edges: Vec<String>,
        skipped: Vec<String>,
    },
    Rejected {
        errors: Vec<String>,
    },
}

impl TurnPayload {
    fn to_value(&self) -> EngineResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// One transcript line for the prompt, if this payload carries speech.
    fn transcript_text(&self) -> Option<&str> {
        match self {
            TurnPayload::Inbound { text } | TurnPayload::Reply { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnInput {
    pub session_key: String,
    pub agent_id: String,
    pub channel: String,
    pub peer: String,
    pub text: String,
}

impl TurnInput {
    pub fn new(session_key: &str, agent_id: &str, text: &str) -> Self {
        Self {
            session_key: session_key.to_string(),
            agent_id: agent_id.to_string(),
            channel: String::new(),
            peer: String::new(),
            text: text.to_string(),
        }
    }

    pub fn with_route(mut self, channel: &str, peer: &str) -> Self {
        self.channel = channel.to_string();
        self.peer = peer.to_string();
        self
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub inbound: Event,
    pub reply: Event,
    /// Number of archive events fed into the prompt.
    pub recalled: usize,
    pub proposal: Option<Proposal>,
    pub compile: Option<CompileReport>,
    /// Why the proposal was not applied, when it wasn't.
    pub rejection: Option<Vec<String>>,
    pub convergence: ConvergenceReport,
}

pub struct Circulation<M: Mind> {
    archive: ArchiveStore,
    graph: GraphStore,
    paths: StoragePaths,
    config: SoulConfig,
    backup: Option<Arc<dyn BackupWriter>>,
    mind: M,
}

impl<M: Mind> Circulation<M> {
    /// Open both stores and `soul.toml` under `paths`.
    pub fn open(paths: StoragePaths, mind: M) -> EngineResult<Self> {
        let config = SoulConfig::load(&paths)?;
        let archive = ArchiveStore::open(&paths)?;
        let graph = GraphStore::open(&paths)?;
        Ok(Self::new(archive, graph, paths, config, mind))
    }

    pub fn new(
        archive: ArchiveStore,
        graph: GraphStore,
        paths: StoragePaths,
        config: SoulConfig,
        mind: M,
    ) -> Self {
        let backup: Option<Arc<dyn BackupWriter>> = if config.backups_enabled {
            Some(Arc::new(FsBackupWriter))
        } else {
            None
        };
        Self { archive, graph, paths, config, backup, mind }
    }

    pub fn with_backup_writer(mut self, writer: Option<Arc<dyn BackupWriter>>) -> Self {
        self.backup = writer;
        self
    }

    pub fn archive(&self) -> &ArchiveStore {
        &self.archive
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn config(&self) -> &SoulConfig {
        &self.config
    }

    pub fn compiler(&self) -> Compiler<'_> {
        Compiler::new(&self.graph, self.paths.clone(), self.config.clone())
            .with_backup_writer(self.backup.clone())
    }

    fn append(&self, input: &TurnInput, event_type: EventType, payload: &TurnPayload) -> EngineResult<Event> {
        self.archive.append_to_session(
            EventRecord::new(&input.session_key, event_type, &input.agent_id)
                .with_route(&input.channel, &input.peer)
                .with_payload(payload.to_value()?),
        )
    }

    pub async fn run_turn(&self, input: TurnInput) -> EngineResult<TurnOutcome> {
        let inbound = self.append(
            &input,
            EventType::Message,
            &TurnPayload::Inbound { text: input.text.clone() },
        )?;

        let options = RecallOptions::from_config(&self.config);
        let history: Vec<Event> = recall(&self.archive, &self.graph, &input.text, &options)?
            .into_iter()
            .filter(|e| e.event_hash != inbound.event_hash)
            .collect();
        let nodes = self.indexed_nodes(&input.text, options.semantic_node_limit)?;
        let compiler = self.compiler();
        let prompt = build_prompt(&compiler.read_capsule()?, &nodes, &history, &input.text);

        info!(
            "[circulation] Turn in {}: {} recalled event(s), {} indexed node(s), prompt {} chars",
            input.session_key,
            history.len(),
            nodes.len(),
            prompt.chars().count()
        );
        let reply_text = self.mind.think(&prompt).await?;

        let reply = self.append(
            &input,
            EventType::Message,
            &TurnPayload::Reply { text: reply_text.clone() },
        )?;

        let mut outcome = TurnOutcome {
            inbound,
            reply,
            recalled: history.len(),
            proposal: None,
            compile: None,
            rejection: None,
            convergence: ConvergenceReport::default(),
        };

        match extract_proposal(&reply_text) {
            Ok(Some(proposal)) => self.apply_proposal(&input, &compiler, proposal, &mut outcome)?,
            Ok(None) => {}
            Err(e) => {
                warn!("[circulation] Unparseable proposal: {}", e);
                self.reject(&input, vec![e.to_string()], &mut outcome)?;
            }
        }

        outcome.convergence = ConvergenceAnalyzer::from_config(&self.graph, &self.config).analyze()?;
        Ok(outcome)
    }

    /// Nodes the mind may name by id: premise matches for the inbound text
    /// first, then the most salient active nodes, each at most `limit`.
    fn indexed_nodes(&self, text: &str, limit: usize) -> EngineResult<Vec<Node>> {
        let mut seen = HashSet::new();
        let hits = self.graph.search_nodes(text, limit)?.into_iter().map(|(node, _)| node);
        let top = self.graph.get_top_salience_nodes(limit)?;
        Ok(hits
            .chain(top)
            .filter(|node| seen.insert(node.node_id.clone()))
            .collect())
    }

    fn apply_proposal(
        &self,
        input: &TurnInput,
        compiler: &Compiler<'_>,
        proposal: Proposal,
        outcome: &mut TurnOutcome,
    ) -> EngineResult<()> {
        self.append(input, EventType::Proposal, &TurnPayload::Proposal { proposal: proposal.clone() })?;

        let evidence = outcome.inbound.event_hash.clone();
        match compiler.compile_with_evidence(&proposal, &input.agent_id, Some(&evidence)) {
            Ok(report) => {
                if let Some(ref cp) = report.checkpoint {
                    self.append(
                        input,
                        EventType::Commit,
                        &TurnPayload::Commit {
                            checkpoint_id: cp.checkpoint_id.clone(),
                            version: cp.version,
                            capsule_hash: cp.capsule_hash.clone(),
                            created: report.created.clone(),
                            reinforced: report.reinforced.clone(),
                            contradicted: report.contradicted.clone(),
                            edges: report.edges_created.clone(),
                            skipped: report.skipped_ids.clone(),
                        },
                    )?;
                }
                outcome.compile = Some(report);
            }
            Err(EngineError::Validation { errors }) => self.reject(input, errors, outcome)?,
            Err(e @ EngineError::EdgeEndpoint { .. }) => {
                self.reject(input, vec![e.to_string()], outcome)?
            }
            Err(e) => return Err(e),
        }
        outcome.proposal = Some(proposal);
        Ok(())
    }

    fn reject(&self, input: &TurnInput, errors: Vec<String>, outcome: &mut TurnOutcome) -> EngineResult<()> {
        warn!(
            "[circulation] Proposal rejected in {}: {}",
            input.session_key,
            errors.join("; ")
        );
        self.append(input, EventType::SystemNotice, &TurnPayload::Rejected { errors: errors.clone() })?;
        outcome.rejection = Some(errors);
        Ok(())
    }
}

const PROPOSAL_INSTRUCTIONS: &str = "To change what you remember, end your reply with a block:
<proposal>{\"add\": [{\"premise\": \"…\", \"nodeType\": \"preference\"}], \"reinforce\": [\"<node id>\"], \"contradict\": [], \"edges\": []}</proposal>";

/// Assemble the text handed to the mind. The node index carries the ids a
/// proposal's `reinforce`, `contradict` and `edges` refer to.
pub fn build_prompt(capsule: &str, nodes: &[Node], history: &[Event], inbound: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(capsule.trim_end());
    prompt.push_str("\n\n## Nodes\n");
    for node in nodes {
        prompt.push_str(&format!("- {} [{}] {}\n", node.node_id, node.node_type, node.premise));
    }
    prompt.push_str("\n## Recalled\n");
    for event in history {
        let Ok(payload) = serde_json::from_value::<TurnPayload>(event.payload.clone()) else {
            continue;
        };
        if let Some(text) = payload.transcript_text() {
            prompt.push_str(&format!("[{}] {}: {}\n", event.timestamp, event.agent_id, text));
        }
    }
    prompt.push_str("\n## Inbound\n");
    prompt.push_str(inbound);
    prompt.push_str("\n\n");
    prompt.push_str(PROPOSAL_INSTRUCTIONS);
    prompt.push('\n');
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::soul_types::{NewNode, NodeType};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedMind {
        replies: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedMind {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Mind for ScriptedMind {
        async fn think(&self, prompt: &str) -> EngineResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| EngineError::Mind("script exhausted".into()))
        }
    }

    fn circulation(dir: &tempfile::TempDir, replies: &[&str]) -> Circulation<ScriptedMind> {
        Circulation::new(
            ArchiveStore::open_in_memory().unwrap(),
            GraphStore::open_in_memory().unwrap(),
            StoragePaths::new(dir.path()),
            SoulConfig::default(),
            ScriptedMind::new(replies),
        )
        .with_backup_writer(None)
    }

    fn types(c: &Circulation<ScriptedMind>) -> Vec<EventType> {
        c.archive()
            .get_events_by_session("s1")
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    #[tokio::test]
    async fn plain_reply_archives_two_messages() {
        let dir = tempfile::tempdir().unwrap();
        let c = circulation(&dir, &["Hello!"]);
        let outcome = c.run_turn(TurnInput::new("s1", "soul", "hi")).await.unwrap();
        assert!(outcome.proposal.is_none());
        assert_eq!(types(&c), vec![EventType::Message, EventType::Message]);
        assert_eq!(outcome.reply.parent_hash.as_deref(), Some(outcome.inbound.event_hash.as_str()));
        assert!(c.archive().verify_hash_chain().unwrap().ok);
    }

    #[tokio::test]
    async fn proposal_is_compiled_with_inbound_as_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let reply = "Noted.\n<proposal>{\"add\": [{\"premise\": \"User drinks green tea\", \"nodeType\": \"preference\"}]}</proposal>";
        let c = circulation(&dir, &[reply, "Tea, right?"]);
        let first = c.run_turn(TurnInput::new("s1", "soul", "I drink green tea")).await.unwrap();

        let report = first.compile.unwrap();
        assert_eq!(report.created.len(), 1);
        assert_eq!(
            types(&c),
            vec![EventType::Message, EventType::Message, EventType::Proposal, EventType::Commit]
        );
        let evidence = c.graph().get_evidence(&report.created[0]).unwrap();
        assert_eq!(evidence[0].event_hash, first.inbound.event_hash);

        c.run_turn(TurnInput::new("s1", "soul", "what do I drink? tea")).await.unwrap();
        let prompts = c.mind.prompts.lock().unwrap();
        assert!(prompts[1].contains("I drink green tea"));
        assert!(prompts[1].contains("## Inbound\nwhat do I drink? tea"));
    }

    #[tokio::test]
    async fn invalid_proposal_becomes_system_notice() {
        let dir = tempfile::tempdir().unwrap();
        let reply = "<proposal>{\"add\": [{\"premise\": \"\", \"nodeType\": \"belief\"}]}</proposal>";
        let c = circulation(&dir, &[reply]);
        let outcome = c.run_turn(TurnInput::new("s1", "soul", "hi")).await.unwrap();
        assert_eq!(outcome.rejection.as_ref().map(|e| e.len()), Some(2));
        assert!(outcome.compile.is_none());
        assert_eq!(c.graph().count_nodes().unwrap(), 0);
        assert_eq!(types(&c).last(), Some(&EventType::SystemNotice));
    }

    #[tokio::test]
    async fn malformed_block_is_rejected_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let c = circulation(&dir, &["<proposal>{oops</proposal>"]);
        let outcome = c.run_turn(TurnInput::new("s1", "soul", "hi")).await.unwrap();
        assert!(outcome.rejection.is_some());
        assert!(outcome.proposal.is_none());
    }

    #[tokio::test]
    async fn convergence_runs_after_compile() {
        let dir = tempfile::tempdir().unwrap();
        let c = circulation(&dir, &[]);
        let id = c
            .graph()
            .create_node(
                NewNode::new("settling", NodeType::Premise, "t")
                    .with_status(crate::atoms::soul_types::NodeStatus::Provisional)
                    .with_weight(crate::atoms::soul_types::PartialWeight {
                        commitment: Some(0.75),
                        uncertainty: Some(0.25),
                        ..Default::default()
                    }),
            )
            .unwrap();
        let reply = format!("ok <proposal>{{\"reinforce\": [\"{}\"]}}</proposal>", id);
        c.mind.replies.lock().unwrap().push_back(reply);
        let outcome = c.run_turn(TurnInput::new("s1", "soul", "yes")).await.unwrap();
        assert_eq!(outcome.convergence.promoted_node_ids, vec![id]);
    }

    #[tokio::test]
    async fn mind_failure_propagates_after_inbound_is_archived() {
        let dir = tempfile::tempdir().unwrap();
        let c = circulation(&dir, &[]);
        let err = c.run_turn(TurnInput::new("s1", "soul", "hi")).await.unwrap_err();
        assert!(matches!(err, EngineError::Mind(_)));
        assert_eq!(c.archive().get_event_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn prompt_lists_node_ids_for_proposals() {
        let dir = tempfile::tempdir().unwrap();
        let c = circulation(&dir, &["ok"]);
        let id = c
            .graph()
            .create_node(NewNode::new("User drinks green tea", NodeType::Preference, "t"))
            .unwrap();
        c.run_turn(TurnInput::new("s1", "soul", "tea again")).await.unwrap();
        let prompts = c.mind.prompts.lock().unwrap();
        let line = format!("- {} [preference] User drinks green tea\n", id);
        assert_eq!(prompts[0].matches(&line).count(), 1);
        assert!(prompts[0].find("## Nodes").unwrap() < prompts[0].find("## Recalled").unwrap());
    }

    #[test]
    fn payload_kind_tag_on_the_wire() {
        let v = serde_json::to_value(TurnPayload::Inbound { text: "x".into() }).unwrap();
        assert_eq!(v, serde_json::json!({ "kind": "inbound", "text": "x" }));
    }
}
