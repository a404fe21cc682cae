// ── Soul Atoms: Constants ──────────────────────────────────────────────────
// Named constants shared across layers. Module-local tuning values (weight
// deltas, recall defaults) live next to the code that uses them.

// ── Storage artifact names ─────────────────────────────────────────────────
// These filenames appear inside backup manifests; older snapshots restore by
// these exact names.
pub const ARCHIVE_DB_FILE: &str = "archive.db";
pub const GRAPH_DB_FILE: &str = "graph.db";
pub const CAPSULE_FILE: &str = "capsule.md";
pub const CONFIG_FILE: &str = "soul.toml";
pub const BACKUPS_DIR: &str = "backups";
pub const BACKUP_MANIFEST_FILE: &str = "manifest.json";

/// Directory name under the platform data dir when no root is supplied.
pub const DEFAULT_STORAGE_DIR: &str = "lmtlss-soul";

// ── Proposal wire markers ──────────────────────────────────────────────────
// A mind emits graph edits between these markers inside its reply text.
pub const PROPOSAL_START_MARKER: &str = "<proposal>";
pub const PROPOSAL_END_MARKER: &str = "</proposal>";

// ── Capsule rendering ──────────────────────────────────────────────────────
pub const CAPSULE_TRUNCATION_MARKER: &str = "\n[… capsule truncated]";
pub const CAPSULE_HEADER: &str = "# Soul Capsule";

// ── Timestamps ─────────────────────────────────────────────────────────────
// Fixed-width UTC format: lexical order == chronological order, which the
// archive relies on for range queries and recall ordering.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
