// Storage location for one soul.
// An explicit value passed into every store constructor. There is no
// process-wide path resolver. Tests point it at a temp dir.

use crate::atoms::constants::{
    ARCHIVE_DB_FILE, BACKUPS_DIR, CAPSULE_FILE, CONFIG_FILE, DEFAULT_STORAGE_DIR, GRAPH_DB_FILE,
};
use crate::atoms::error::{EngineError, EngineResult};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<platform data dir>/lmtlss-soul`.
    pub fn default_location() -> EngineResult<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| EngineError::Config("no platform data directory".into()))?;
        Ok(Self::new(base.join(DEFAULT_STORAGE_DIR)))
    }

    /// Create the root (and backups dir) if missing.
    pub fn ensure(&self) -> EngineResult<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.backups_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_db(&self) -> PathBuf {
        self.root.join(ARCHIVE_DB_FILE)
    }

    pub fn graph_db(&self) -> PathBuf {
        self.root.join(GRAPH_DB_FILE)
    }

    pub fn capsule_file(&self) -> PathBuf {
        self.root.join(CAPSULE_FILE)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join(BACKUPS_DIR)
    }
}
