// lmtlss-core — persistent memory engine for a stateless agent.
//
// Layering (same rule as the atoms/ header): atoms → engine.
//   atoms   — pure types, constants, errors
//   engine  — stores (archive, graph) and the pipelines built on them

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult};
pub use atoms::soul_types::*;
pub use engine::archive::ArchiveStore;
pub use engine::circulation::{Circulation, Mind, TurnInput, TurnOutcome, TurnPayload};
pub use engine::compiler::backup::{BackupManifest, BackupWriter, FsBackupWriter};
pub use engine::compiler::{extract_proposal, validate_proposal, Compiler};
pub use engine::config::SoulConfig;
pub use engine::convergence::ConvergenceAnalyzer;
pub use engine::graph::GraphStore;
pub use engine::paths::StoragePaths;
pub use engine::recall::{recall, RecallOptions};
