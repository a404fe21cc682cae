// Engine configuration.
// Loaded from `soul.toml` in the storage root; every field has a default so
// a missing file or a partial file is fine. Threaded explicitly into the
// Compiler, ConvergenceAnalyzer and Circulation.

use crate::atoms::error::{EngineError, EngineResult};
use crate::engine::paths::StoragePaths;
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SoulConfig {
    /// Maximum capsule length in characters (truncation marker included).
    pub capsule_char_budget: usize,
    /// Maximum number of active nodes rendered into the capsule.
    pub capsule_max_nodes: usize,
    /// Promotion threshold: commitment >= t and uncertainty <= 1 - t.
    pub convergence_threshold: f64,
    /// Provisional nodes examined per convergence pass.
    pub convergence_scan_limit: usize,
    /// Chronological recall window.
    pub recall_recent_limit: usize,
    /// Graph nodes consulted by semantic recall.
    pub recall_semantic_nodes: usize,
    /// Events kept from the semantic path.
    pub recall_semantic_events: usize,
    /// Write a backup snapshot after each checkpoint.
    pub backups_enabled: bool,
}

impl Default for SoulConfig {
    fn default() -> Self {
        Self {
            capsule_char_budget: 4000,
            capsule_max_nodes: 40,
            convergence_threshold: 0.8,
            convergence_scan_limit: 200,
            recall_recent_limit: 20,
            recall_semantic_nodes: 5,
            recall_semantic_events: 10,
            backups_enabled: true,
        }
    }
}

impl SoulConfig {
    /// Read `soul.toml` under `paths`, or defaults if the file does not exist.
    pub fn load(paths: &StoragePaths) -> EngineResult<Self> {
        let file = paths.config_file();
        if !file.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&file)?;
        let config = Self::from_toml(&text)?;
        info!("[config] Loaded {:?}", file);
        Ok(config)
    }

    pub fn from_toml(text: &str) -> EngineResult<Self> {
        let config: SoulConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.convergence_threshold) {
            return Err(EngineError::Config(format!(
                "convergence_threshold must be within [0, 1], got {}",
                self.convergence_threshold
            )));
        }
        if self.capsule_char_budget == 0 {
            return Err(EngineError::Config("capsule_char_budget must be positive".into()));
        }
        Ok(())
    }
}
