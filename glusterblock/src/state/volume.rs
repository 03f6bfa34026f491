use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Bytes, Filesystem};

/// Persisted metadata of one logical volume.
///
/// Records are replaced whole; readers never see a partially updated one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockVolume {
    /// Caller-supplied name, unique across the state store.
    pub name: String,

    /// Backing file on the GlusterFS mount.
    pub backing_file: PathBuf,

    /// Filesystem the backing file was formatted with.
    pub filesystem: Filesystem,

    /// Backing file size, fixed at creation.
    pub size_bytes: Bytes,

    /// Loop device bound to the backing file, `None` while detached.
    #[serde(default)]
    pub loop_device: Option<PathBuf>,

    /// Outstanding mount calls.
    #[serde(default)]
    pub mount_count: u32,

    /// Whether the backing file has been allocated and formatted.
    #[serde(default)]
    pub created: bool,

    /// GlusterFS mount the backing file lives on.
    pub shared_mount: PathBuf,

    /// Where the loop device is mounted while `mount_count > 0`.
    pub mount_point: PathBuf,

    pub created_at: DateTime<Utc>,
}

impl BlockVolume {
    pub fn is_mounted(&self) -> bool {
        self.mount_count > 0
    }

    /// Mount point while mounted, `None` otherwise.
    pub fn active_mount_point(&self) -> Option<&PathBuf> {
        self.is_mounted().then_some(&self.mount_point)
    }
}
