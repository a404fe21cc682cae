// ── Soul Atoms: Memory Engine Types ────────────────────────────────────────
//
// Type definitions for the soul memory engine: archive events, graph nodes,
// edges, evidence links, checkpoints, and the proposal wire format.
// These are pure data types (no logic, no DB access, no I/O).
//
// Follows the project pattern: structs in atoms/, impls in engine/.
// Enums that are stored in SQLite round-trip through Display/FromStr using
// the same snake_case spelling serde uses on the wire.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 1: Archive Events
// ═══════════════════════════════════════════════════════════════════════════

/// Closed set of archive event kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Inbound or outbound conversational message.
    Message,
    /// A graph proposal extracted from model output.
    Proposal,
    /// Record of a successful compile (checkpoint issued).
    Commit,
    /// Engine-generated notice (rejected proposal, maintenance, …).
    SystemNotice,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Message => write!(f, "message"),
            EventType::Proposal => write!(f, "proposal"),
            EventType::Commit => write!(f, "commit"),
            EventType::SystemNotice => write!(f, "system_notice"),
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(EventType::Message),
            "proposal" => Ok(EventType::Proposal),
            "commit" => Ok(EventType::Commit),
            "system_notice" => Ok(EventType::SystemNotice),
            _ => Err(format!("Unknown event type: {}", s)),
        }
    }
}

/// Caller-supplied fields for a new archive event.
/// The archive fills in the hash (and the timestamp when absent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub parent_hash: Option<String>,
    /// RFC 3339 timestamp. `None` → now. Normalised to millisecond UTC.
    #[serde(default)]
    pub timestamp: Option<String>,
    pub session_key: String,
    pub event_type: EventType,
    pub agent_id: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub peer: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventRecord {
    /// Start a record with empty channel/peer and a null payload.
    pub fn new(session_key: &str, event_type: EventType, agent_id: &str) -> Self {
        Self {
            parent_hash: None,
            timestamp: None,
            session_key: session_key.to_string(),
            event_type,
            agent_id: agent_id.to_string(),
            channel: String::new(),
            peer: String::new(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_parent(mut self, parent_hash: Option<String>) -> Self {
        self.parent_hash = parent_hash;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_route(mut self, channel: &str, peer: &str) -> Self {
        self.channel = channel.to_string();
        self.peer = peer.to_string();
        self
    }

    pub fn at(mut self, timestamp: &str) -> Self {
        self.timestamp = Some(timestamp.to_string());
        self
    }
}

/// An immutable, hash-addressed archive row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_hash: String,
    pub parent_hash: Option<String>,
    pub timestamp: String,
    pub session_key: String,
    pub event_type: EventType,
    pub agent_id: String,
    pub channel: String,
    pub peer: String,
    pub payload: serde_json::Value,
}

/// What went wrong at one position of the hash chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainFaultKind {
    /// The stored hash does not match the hash recomputed from stored fields.
    HashMismatch { expected: String, actual: String },
    /// The declared parent is not an earlier event in the archive.
    MissingParent { parent_hash: String },
    /// The declared parent exists but belongs to another session.
    CrossSessionParent {
        parent_hash: String,
        parent_session: String,
    },
    /// The parent is not the session's previous event: a fork off an older
    /// event, a parent on a session root, or a second root.
    ParentMismatch {
        expected: Option<String>,
        actual: Option<String>,
    },
}

/// A single positional fault found by `verify_hash_chain`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainFault {
    /// Zero-based position in insertion order.
    pub position: usize,
    pub event_hash: String,
    #[serde(flatten)]
    pub kind: ChainFaultKind,
}

/// Result of a full archive walk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HashChainReport {
    pub ok: bool,
    pub checked: usize,
    pub errors: Vec<ChainFault>,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 2: Graph Nodes & Weights
// ═══════════════════════════════════════════════════════════════════════════

/// Closed set of node kinds. Declaration order is the capsule section order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Identity,
    Premise,
    Relationship,
    Preference,
    Goal,
    Value,
    Operational,
    Spatial,
    Temporal,
}

impl NodeType {
    pub const ALL: [NodeType; 9] = [
        NodeType::Identity,
        NodeType::Premise,
        NodeType::Relationship,
        NodeType::Preference,
        NodeType::Goal,
        NodeType::Value,
        NodeType::Operational,
        NodeType::Spatial,
        NodeType::Temporal,
    ];

    /// Section heading used in the capsule.
    pub fn heading(&self) -> &'static str {
        match self {
            NodeType::Identity => "Identity",
            NodeType::Premise => "Premises",
            NodeType::Relationship => "Relationships",
            NodeType::Preference => "Preferences",
            NodeType::Goal => "Goals",
            NodeType::Value => "Values",
            NodeType::Operational => "Operational",
            NodeType::Spatial => "Places",
            NodeType::Temporal => "Timeline",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeType::Identity => "identity",
            NodeType::Premise => "premise",
            NodeType::Relationship => "relationship",
            NodeType::Preference => "preference",
            NodeType::Goal => "goal",
            NodeType::Value => "value",
            NodeType::Operational => "operational",
            NodeType::Spatial => "spatial",
            NodeType::Temporal => "temporal",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for NodeType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .iter()
            .copied()
            .find(|t| t.to_string() == s)
            .ok_or_else(|| format!("Unknown node type: {}", s))
    }
}

/// Lifecycle of a belief.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Active,
    Provisional,
    Archived,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Active => write!(f, "active"),
            NodeStatus::Provisional => write!(f, "provisional"),
            NodeStatus::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for NodeStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(NodeStatus::Active),
            "provisional" => Ok(NodeStatus::Provisional),
            "archived" => Ok(NodeStatus::Archived),
            _ => Err(format!("Unknown node status: {}", s)),
        }
    }
}

/// Six-dimensional belief state.
///
/// Ranges: `valence` in [-1, 1], everything else in [0, 1].
/// Transforms live in `engine::weights` and always return a clamped copy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WeightVector {
    /// Attention priority.
    pub salience: f64,
    /// Approach (+) / avoid (−) charge.
    pub valence: f64,
    /// Urgency.
    pub arousal: f64,
    /// Resistance to revision.
    pub commitment: f64,
    /// Inverse confidence.
    pub uncertainty: f64,
    /// Coupling to other high-salience nodes.
    pub resonance: f64,
}

impl Default for WeightVector {
    fn default() -> Self {
        Self {
            salience: 0.5,
            valence: 0.0,
            arousal: 0.0,
            commitment: 0.5,
            uncertainty: 0.5,
            resonance: 0.0,
        }
    }
}

/// A weight update where only supplied fields change.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PartialWeight {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salience: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arousal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitment: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resonance: Option<f64>,
}

/// Optional location metadata on a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SpatialMeta {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Optional time-span metadata on a node (RFC 3339 strings).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TemporalMeta {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// A distilled belief in the graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub node_id: String,
    pub premise: String,
    pub node_type: NodeType,
    pub status: NodeStatus,
    pub weight: WeightVector,
    pub created_at: String,
    pub updated_at: String,
    pub created_by: String,
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial: Option<SpatialMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalMeta>,
}

/// Input for `GraphStore::create_node`.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub premise: String,
    pub node_type: NodeType,
    pub weight: PartialWeight,
    pub created_by: String,
    pub status: NodeStatus,
    pub spatial: Option<SpatialMeta>,
    pub temporal: Option<TemporalMeta>,
}

impl NewNode {
    /// An active node with default weights.
    pub fn new(premise: &str, node_type: NodeType, created_by: &str) -> Self {
        Self {
            premise: premise.to_string(),
            node_type,
            weight: PartialWeight::default(),
            created_by: created_by.to_string(),
            status: NodeStatus::Active,
            spatial: None,
            temporal: None,
        }
    }

    pub fn with_weight(mut self, weight: PartialWeight) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 3: Edges & Evidence
// ═══════════════════════════════════════════════════════════════════════════

/// Closed set of edge relations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Supports,
    Contradicts,
    Refines,
    DependsOn,
    RelatedTo,
    CausedBy,
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Relation::Supports => write!(f, "supports"),
            Relation::Contradicts => write!(f, "contradicts"),
            Relation::Refines => write!(f, "refines"),
            Relation::DependsOn => write!(f, "depends_on"),
            Relation::RelatedTo => write!(f, "related_to"),
            Relation::CausedBy => write!(f, "caused_by"),
        }
    }
}

impl std::str::FromStr for Relation {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supports" => Ok(Relation::Supports),
            "contradicts" => Ok(Relation::Contradicts),
            "refines" => Ok(Relation::Refines),
            "depends_on" => Ok(Relation::DependsOn),
            "related_to" => Ok(Relation::RelatedTo),
            "caused_by" => Ok(Relation::CausedBy),
            _ => Err(format!("Unknown relation: {}", s)),
        }
    }
}

/// A directed, weighted link between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub edge_id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation: Relation,
    /// Strength (0.0–1.0).
    pub strength: f64,
    pub created_at: String,
}

/// How an archive event bears on a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Supports,
    Contradicts,
    Origin,
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkType::Supports => write!(f, "supports"),
            LinkType::Contradicts => write!(f, "contradicts"),
            LinkType::Origin => write!(f, "origin"),
        }
    }
}

impl std::str::FromStr for LinkType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supports" => Ok(LinkType::Supports),
            "contradicts" => Ok(LinkType::Contradicts),
            "origin" => Ok(LinkType::Origin),
            _ => Err(format!("Unknown link type: {}", s)),
        }
    }
}

/// Cross-reference from a node to the archive event that justifies it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceLink {
    pub node_id: String,
    pub event_hash: String,
    pub link_type: LinkType,
    pub created_at: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 4: Checkpoints & Capsule
// ═══════════════════════════════════════════════════════════════════════════

/// Immutable descriptor of graph state after one successful compile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub version: i64,
    pub node_count: usize,
    pub edge_count: usize,
    pub capsule_hash: String,
    pub created_at: String,
    pub actor_id: String,
    /// Node ids rendered into the capsule this checkpoint describes.
    #[serde(default)]
    pub capsule_node_ids: Vec<String>,
}

/// Input for `GraphStore::create_checkpoint`. Version and id are assigned
/// by the store.
#[derive(Debug, Clone)]
pub struct NewCheckpoint {
    pub capsule_hash: String,
    pub actor_id: String,
    pub capsule_node_ids: Vec<String>,
}

/// Rendered working-memory summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Capsule {
    pub text: String,
    /// SHA-256 hex of `text`.
    pub hash: String,
    /// Ids of nodes that made it into the rendering, salience descending.
    pub node_ids: Vec<String>,
    pub truncated: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 5: Proposal Wire Format
// ═══════════════════════════════════════════════════════════════════════════
//
// Strings (not enums) for node types and relations so that an unknown value
// is reported by `validate_proposal` as a message, instead of failing the
// whole JSON parse with an opaque serde error.

/// A batch of graph edits emitted by a mind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    #[serde(default)]
    pub add: Vec<ProposalNode>,
    #[serde(default)]
    pub reinforce: Vec<String>,
    #[serde(default)]
    pub contradict: Vec<String>,
    #[serde(default)]
    pub edges: Vec<ProposalEdge>,
}

impl Proposal {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty()
            && self.reinforce.is_empty()
            && self.contradict.is_empty()
            && self.edges.is_empty()
    }
}

/// A node to be created.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProposalNode {
    #[serde(default)]
    pub premise: String,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub weight: PartialWeight,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial: Option<SpatialMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalMeta>,
}

/// An edge to be created.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProposalEdge {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub relation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 6: Reports
// ═══════════════════════════════════════════════════════════════════════════

/// Outcome of one `Compiler::compile` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompileReport {
    /// False for a documented no-op (nothing applied, nothing checkpointed).
    pub changed: bool,
    pub contradicted: Vec<String>,
    pub created: Vec<String>,
    pub reinforced: Vec<String>,
    pub edges_created: Vec<String>,
    /// reinforce/contradict ids that named no node.
    pub skipped_ids: Vec<String>,
    pub checkpoint: Option<Checkpoint>,
    pub capsule: Option<Capsule>,
    /// Directory the backup writer reported, if any.
    pub backup_location: Option<String>,
    /// Why the snapshot failed. The checkpoint still stands.
    pub backup_error: Option<String>,
}

/// Outcome of one convergence pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConvergenceReport {
    pub promoted_count: usize,
    pub promoted_node_ids: Vec<String>,
}
