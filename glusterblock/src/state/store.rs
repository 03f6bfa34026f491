//! JSON state file.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::BlockVolume;
use crate::constants::STATE_VERSION;
use crate::errors::{BlockError, BlockResult};

/// Volume records keyed by name.
pub type VolumeMap = BTreeMap<String, BlockVolume>;

/// On-disk layout of the state file.
///
/// Unknown fields are ignored so that a newer writer does not lock out an
/// older reader.
#[derive(Serialize, Deserialize, Debug, Default)]
struct StateFile {
    /// Schema version for future compatibility
    version: u32,

    #[serde(default)]
    volumes: VolumeMap,
}

/// Durable store of the volume records.
///
/// Serialization only; invariants are enforced by the driver.
#[derive(Clone, Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted records.
    ///
    /// A missing file is a first run and yields an empty map. A file that
    /// cannot be read or parsed is [`BlockError::StateCorrupt`]; silently
    /// starting empty would orphan every existing backing file.
    pub async fn load(&self) -> BlockResult<VolumeMap> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "State file not found, starting empty");
                return Ok(VolumeMap::new());
            }
            Err(e) => return Err(self.corrupt(format!("unreadable: {e}"))),
        };

        let state: StateFile =
            serde_json::from_slice(&contents).map_err(|e| self.corrupt(e.to_string()))?;

        if state.version > STATE_VERSION {
            tracing::warn!(
                version = state.version,
                supported = STATE_VERSION,
                "State file written by a newer version, unknown fields are ignored"
            );
        }

        for (key, volume) in &state.volumes {
            if key != &volume.name {
                return Err(self.corrupt(format!(
                    "entry '{key}' holds volume '{}'",
                    volume.name
                )));
            }
        }

        tracing::debug!(
            path = %self.path.display(),
            volumes = state.volumes.len(),
            "Loaded state"
        );
        Ok(state.volumes)
    }

    /// Atomically replace the state file with `volumes`.
    ///
    /// Writes a temporary file in the same directory, syncs it, renames it
    /// over the state file and syncs the directory. A crash at any point
    /// leaves either the previous or the new state on disk.
    pub async fn save(&self, volumes: &VolumeMap) -> BlockResult<()> {
        let state = StateFile {
            version: STATE_VERSION,
            volumes: volumes.clone(),
        };
        let json = serde_json::to_vec_pretty(&state)
            .map_err(|e| BlockError::Internal(format!("failed to serialize state: {e}")))?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| BlockError::Internal(format!("state writer panicked: {e}")))?
            .map_err(|e| BlockError::io(format!("failed to write {}", self.path.display()), e))?;

        tracing::trace!(path = %self.path.display(), volumes = volumes.len(), "Saved state");
        Ok(())
    }

    fn corrupt(&self, reason: String) -> BlockError {
        BlockError::StateCorrupt {
            path: self.path.display().to_string(),
            reason,
        }
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    File::open(dir)?.sync_all()
}
