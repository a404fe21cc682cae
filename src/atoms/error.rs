// ── Soul Atoms: Error Types ────────────────────────────────────────────────
// Single canonical error enum for the memory engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, DB, validation, references…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • Every domain variant carries the ids needed to act on it without
//     re-reading the store (offending index, missing id, parent hash).
//   • Hash-chain faults are NOT errors: verification reports them as data
//     (see `HashChainReport`) so the full extent of corruption is visible.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite / rusqlite database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// `soul.toml` could not be parsed.
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A proposal failed schema validation. The whole batch was rejected.
    #[error("Proposal rejected: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    /// An edge in a proposal (or a direct `create_edge`) names a node that
    /// does not exist. `index` is the position inside the proposal's edge list
    /// (0 for direct calls).
    #[error("Edge {index} ({source_id} -> {target_id}): node {missing_id} does not exist")]
    EdgeEndpoint {
        index: usize,
        source_id: String,
        target_id: String,
        missing_id: String,
    },

    /// An appended event declares a parent that is not an earlier event of
    /// the same session.
    #[error("Unknown parent {parent_hash} for session {session_key}")]
    UnknownParent {
        parent_hash: String,
        session_key: String,
    },

    /// An appended event's parent is not the session's current head.
    #[error("Parent {actual:?} is not the head {head:?} of session {session_key}")]
    StaleParent {
        actual: Option<String>,
        head: Option<String>,
        session_key: String,
    },

    /// A lookup by id found nothing where something was required.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A weight value was NaN or infinite.
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),

    /// Engine configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The injected mind callable failed.
    #[error("Mind error: {0}")]
    Mind(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    /// Create a not-found error for a node id.
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "Node", id: id.into() }
    }

    /// Create a validation error from a message list.
    pub fn validation(errors: Vec<String>) -> Self {
        Self::Validation { errors }
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations return this type.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<EngineError> for String {
    fn from(e: EngineError) -> Self {
        e.to_string()
    }
}
