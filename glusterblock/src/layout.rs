use std::path::{Path, PathBuf};

use crate::constants::layout as dirs;
use crate::errors::{BlockError, BlockResult};

/// Directory structure under the driver root.
///
/// ```text
/// <root>/
/// ├── .lock                            # DriverLock
/// ├── gluster-block-file-state.json    # StateStore
/// ├── gluster/
/// │   └── <volume_name>/               # shared GlusterFS mount
/// └── volumes/
///     └── <name>/                      # per-volume mount point
/// ```
#[derive(Clone, Debug)]
pub struct DriverLayout {
    root: PathBuf,
}

impl DriverLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join(dirs::STATE_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(dirs::LOCK_FILE)
    }

    /// Parent of every GlusterFS mount point.
    pub fn gluster_dir(&self) -> PathBuf {
        self.root.join(dirs::GLUSTER_DIR)
    }

    pub fn volumes_dir(&self) -> PathBuf {
        self.root.join(dirs::VOLUMES_DIR)
    }

    /// Mount point of one logical volume.
    pub fn mount_point(&self, name: &str) -> PathBuf {
        self.volumes_dir().join(name)
    }

    /// Create the directory skeleton.
    pub async fn prepare(&self) -> BlockResult<()> {
        for dir in [self.root.clone(), self.gluster_dir(), self.volumes_dir()] {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                BlockError::io(format!("failed to create {}", dir.display()), e)
            })?;
        }
        Ok(())
    }
}
