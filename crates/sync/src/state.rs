//! Durable per-target sync cursors.
//!
//! Cursors live in one versioned JSON file keyed by backend fingerprint. A
//! missing, unreadable, or version-mismatched file is treated as empty: the
//! engine re-bootstraps and idempotent upserts absorb the duplicate writes.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

const STATE_FILE_VERSION: u32 = 1;

/// Cursor state for one synchronization target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetCursors {
    /// Whether the one-time full upload of pre-existing local memory ran.
    pub bootstrap_complete: bool,
    /// Highest `updatedAtEpoch` pushed to this target.
    pub last_local_push_epoch: i64,
    /// Highest `updatedAtEpoch` pulled from this target.
    pub last_pull_epoch: i64,
}

#[derive(Debug, Deserialize)]
struct StateFile {
    version: u32,
    targets: BTreeMap<String, TargetCursors>,
}

#[derive(Debug, Serialize)]
struct StateFileRef<'a> {
    version: u32,
    targets: &'a BTreeMap<String, TargetCursors>,
}

/// File-backed map of target fingerprint to cursors.
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all targets. Never fails: any unreadable state yields an empty
    /// map (and a warning), which is always safe to start from.
    #[must_use]
    pub fn load(&self) -> BTreeMap<String, TargetCursors> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "unreadable sync state file, starting fresh");
                return BTreeMap::new();
            },
        };
        match serde_json::from_str::<StateFile>(&raw) {
            Ok(file) if file.version == STATE_FILE_VERSION => file.targets,
            Ok(file) => {
                tracing::warn!(
                    path = %self.path.display(),
                    version = file.version,
                    "unsupported sync state version, starting fresh"
                );
                BTreeMap::new()
            },
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt sync state file, starting fresh");
                BTreeMap::new()
            },
        }
    }

    /// Replace the whole file with the given targets.
    pub fn save(&self, targets: &BTreeMap<String, TargetCursors>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = StateFileRef { version: STATE_FILE_VERSION, targets };
        let mut json = serde_json::to_string_pretty(&file)?;
        json.push('\n');
        fs::write(&self.path, json)?;
        Ok(())
    }
}
