// ── Compiler: Checkpoint Backups ────────────────────────────────────────────
//
// After every checkpoint the compiler hands the storage root to a
// BackupWriter. The filesystem writer lays snapshots out as
//
//   backups/v000007/
//     manifest.json
//     graph.db
//     archive.db      (when present)
//     capsule.md
//
// SQLite `-wal` sidecars are copied alongside when they exist, so a snapshot
// taken while another connection holds un-checkpointed pages stays complete.

use crate::atoms::constants::{
    ARCHIVE_DB_FILE, BACKUPS_DIR, BACKUP_MANIFEST_FILE, CAPSULE_FILE, GRAPH_DB_FILE,
};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::soul_types::Checkpoint;
use crate::engine::now_timestamp;
use crate::engine::paths::StoragePaths;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hook invoked once per issued checkpoint.
pub trait BackupWriter: Send + Sync {
    /// Persist a snapshot of `root`. Returns where it went, if anywhere.
    fn write(
        &self,
        root: &Path,
        checkpoint: &Checkpoint,
        actor_id: &str,
    ) -> EngineResult<Option<PathBuf>>;
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupManifest {
    pub version: i64,
    pub checkpoint: Checkpoint,
    pub actor_id: String,
    /// File names copied into the snapshot directory.
    pub artifacts: Vec<String>,
    pub created_at: String,
}

/// Writes snapshots under `<root>/backups/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsBackupWriter;

fn snapshot_dir(root: &Path, version: i64) -> PathBuf {
    root.join(BACKUPS_DIR).join(format!("v{:06}", version))
}

fn wal_sidecar(name: &str) -> String {
    format!("{}-wal", name)
}

impl BackupWriter for FsBackupWriter {
    fn write(
        &self,
        root: &Path,
        checkpoint: &Checkpoint,
        actor_id: &str,
    ) -> EngineResult<Option<PathBuf>> {
        let dir = snapshot_dir(root, checkpoint.version);
        std::fs::create_dir_all(&dir)?;

        let mut artifacts = Vec::new();
        for name in [GRAPH_DB_FILE, ARCHIVE_DB_FILE, CAPSULE_FILE] {
            for file in [name.to_string(), wal_sidecar(name)] {
                let src = root.join(&file);
                if src.is_file() {
                    std::fs::copy(&src, dir.join(&file))?;
                    artifacts.push(file);
                }
            }
        }
        if !artifacts.iter().any(|a| a == GRAPH_DB_FILE) {
            warn!("[compiler] Backup v{} has no {}", checkpoint.version, GRAPH_DB_FILE);
        }

        let manifest = BackupManifest {
            version: checkpoint.version,
            checkpoint: checkpoint.clone(),
            actor_id: actor_id.to_string(),
            artifacts,
            created_at: now_timestamp(),
        };
        std::fs::write(
            dir.join(BACKUP_MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        info!(
            "[compiler] Backup v{} written to {:?} ({} artifact(s))",
            checkpoint.version,
            dir,
            manifest.artifacts.len()
        );
        Ok(Some(dir))
    }
}

impl FsBackupWriter {
    /// Every readable snapshot manifest, oldest first.
    pub fn list_backups(paths: &StoragePaths) -> EngineResult<Vec<BackupManifest>> {
        let dir = paths.backups_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut manifests = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let manifest_path = entry?.path().join(BACKUP_MANIFEST_FILE);
            if !manifest_path.is_file() {
                continue;
            }
            let text = std::fs::read_to_string(&manifest_path)?;
            match serde_json::from_str::<BackupManifest>(&text) {
                Ok(m) => manifests.push(m),
                Err(e) => warn!("[compiler] Skipping unreadable manifest {:?}: {}", manifest_path, e),
            }
        }
        manifests.sort_by_key(|m| m.version);
        Ok(manifests)
    }

    /// Copy snapshot `version` back over the live files in `paths`.
    ///
    /// Stores opened on `paths` must be closed first. Live WAL sidecars
    /// that the snapshot does not carry are removed so SQLite cannot replay
    /// pages from the newer state onto the restored file.
    pub fn restore(paths: &StoragePaths, version: i64) -> EngineResult<BackupManifest> {
        let dir = snapshot_dir(paths.root(), version);
        let manifest_path = dir.join(BACKUP_MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(EngineError::NotFound {
                kind: "Backup",
                id: format!("v{:06}", version),
            });
        }
        let manifest: BackupManifest =
            serde_json::from_str(&std::fs::read_to_string(&manifest_path)?)?;

        for name in [GRAPH_DB_FILE, ARCHIVE_DB_FILE] {
            let sidecar = wal_sidecar(name);
            let live = paths.root().join(&sidecar);
            if live.is_file() && !manifest.artifacts.contains(&sidecar) {
                std::fs::remove_file(&live)?;
            }
        }
        for file in &manifest.artifacts {
            std::fs::copy(dir.join(file), paths.root().join(file))?;
        }

        info!("[compiler] Restored backup v{} into {:?}", version, paths.root());
        Ok(manifest)
    }
}
