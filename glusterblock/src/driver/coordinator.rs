use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::locks::VolumeLocks;
use super::request::CreateRequest;
use crate::blockfile::BlockFileManager;
use crate::config::DriverConfig;
use crate::errors::{BlockError, BlockResult};
use crate::gluster::{SharedMount, SharedMountManager};
use crate::host::Host;
use crate::layout::DriverLayout;
use crate::state::{BlockVolume, StateStore, VolumeMap};
use crate::util::{is_privileged, remove_dir_if_exists};

/// Where volumes created by this driver are visible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Local,
    Global,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub scope: Scope,
}

/// Volume lifecycle coordinator.
///
/// Cheap to clone; clones share the same state. Mutating operations on one
/// name are serialized, operations on different names run concurrently.
/// Each mutating call runs on its own task, so it completes (or rolls back)
/// even if the caller stops waiting for it.
#[derive(Clone, Debug)]
pub struct VolumeDriver {
    inner: Arc<DriverInner>,
}

#[derive(Debug)]
struct DriverInner {
    config: DriverConfig,
    layout: DriverLayout,
    blocks: BlockFileManager,
    mounts: SharedMountManager,
    store: StateStore,
    /// Serializes state file writes.
    persist: Mutex<()>,
    /// Last persisted state.
    volumes: RwLock<VolumeMap>,
    locks: VolumeLocks,
}

impl VolumeDriver {
    /// Load persisted state and prepare the driver root.
    ///
    /// Shared mounts are not touched here; they are verified lazily when a
    /// volume on them is next used.
    pub async fn open(config: DriverConfig, host: Arc<dyn Host>) -> BlockResult<Self> {
        let layout = DriverLayout::new(&config.root);
        layout.prepare().await?;

        if !is_privileged() {
            tracing::warn!("Not running as root, mount and losetup are likely to fail");
        }

        let store = StateStore::new(layout.state_file());
        let volumes = store.load().await?;

        let mounts = SharedMountManager::new(
            Arc::clone(&host),
            config.gluster.clone(),
            layout.gluster_dir(),
        );
        mounts
            .restore(volumes.values().map(|v| v.shared_mount.clone()))
            .await;

        for volume in volumes.values().filter(|v| !v.created) {
            tracing::warn!(
                volume = %volume.name,
                "Volume creation did not finish, create it again to complete it"
            );
        }

        tracing::info!(
            root = %layout.root().display(),
            source = %config.gluster.source(),
            volumes = volumes.len(),
            "Volume driver ready"
        );

        Ok(Self {
            inner: Arc::new(DriverInner {
                blocks: BlockFileManager::new(host),
                mounts,
                store,
                persist: Mutex::new(()),
                volumes: RwLock::new(volumes),
                locks: VolumeLocks::default(),
                layout,
                config,
            }),
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.inner.config
    }

    pub fn layout(&self) -> &DriverLayout {
        &self.inner.layout
    }

    /// Create a volume, or confirm an identical one exists.
    pub async fn create(
        &self,
        name: &str,
        options: &HashMap<String, String>,
    ) -> BlockResult<BlockVolume> {
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        let options = options.clone();
        detached(async move { inner.create(&name, &options).await }).await
    }

    /// Delete an unmounted volume and its backing file.
    pub async fn remove(&self, name: &str) -> BlockResult<()> {
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        detached(async move { inner.remove(&name).await }).await
    }

    /// Mount a volume for `id` and return its mount point.
    pub async fn mount(&self, name: &str, id: &str) -> BlockResult<PathBuf> {
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        let id = id.to_string();
        detached(async move { inner.mount(&name, &id).await }).await
    }

    /// Release one mount of a volume.
    pub async fn unmount(&self, name: &str, id: &str) -> BlockResult<()> {
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        let id = id.to_string();
        detached(async move { inner.unmount(&name, &id).await }).await
    }

    /// Verify a volume against the live system and repair drift.
    pub async fn reconcile(&self, name: &str) -> BlockResult<BlockVolume> {
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        detached(async move { inner.reconcile(&name).await }).await
    }

    /// Mount point of a mounted volume, `None` while unmounted.
    pub fn path(&self, name: &str) -> BlockResult<Option<PathBuf>> {
        Ok(self.get(name)?.active_mount_point().cloned())
    }

    pub fn get(&self, name: &str) -> BlockResult<BlockVolume> {
        self.inner.lookup(name)
    }

    /// All volumes, sorted by name.
    pub fn list(&self) -> Vec<BlockVolume> {
        self.inner.volumes.read().values().cloned().collect()
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            scope: Scope::Global,
        }
    }

    /// GlusterFS mounts currently tracked.
    pub async fn shared_mounts(&self) -> Vec<SharedMount> {
        self.inner.mounts.snapshot().await
    }

    /// Unmount shared mounts no volume depends on.
    pub async fn shutdown(&self) -> BlockResult<()> {
        self.inner.mounts.shutdown().await
    }
}

/// Run `operation` on its own task and wait for it.
async fn detached<T, F>(operation: F) -> BlockResult<T>
where
    T: Send + 'static,
    F: Future<Output = BlockResult<T>> + Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| BlockError::Internal(format!("volume operation aborted: {e}")))?
}

impl DriverInner {
    async fn create(
        &self,
        name: &str,
        options: &HashMap<String, String>,
    ) -> BlockResult<BlockVolume> {
        let request = CreateRequest::resolve(name, &self.config.defaults, options)?;
        let _guard = self.locks.lock(name).await;

        let existing = self.volumes.read().get(name).cloned();
        if let Some(existing) = existing {
            if let Some(reason) = request.mismatch(&existing) {
                return Err(BlockError::Conflict {
                    name: name.to_string(),
                    reason,
                });
            }
            if existing.created {
                tracing::debug!(volume = %name, "Volume already exists");
                return Ok(existing);
            }
            return self.finish_create(existing).await;
        }

        let shared_mount = self.mounts.acquire(name).await?;
        let volume = BlockVolume {
            name: name.to_string(),
            backing_file: shared_mount.join(&request.file_name),
            filesystem: request.filesystem,
            size_bytes: request.size,
            loop_device: None,
            mount_count: 0,
            created: false,
            shared_mount,
            mount_point: self.layout.mount_point(name),
            created_at: Utc::now(),
        };

        // the pending record goes to disk before the backing file exists, so
        // an interrupted create is completed by the next identical create
        if let Err(e) = self.commit(name, Some(volume.clone())).await {
            self.release_quietly(&volume.shared_mount).await;
            return Err(e);
        }

        if let Err(e) = self
            .blocks
            .allocate(&volume.backing_file, volume.size_bytes)
            .await
        {
            self.abandon_create(&volume, false).await;
            return Err(e);
        }

        match self.format_and_commit(volume.clone()).await {
            Ok(created) => {
                tracing::info!(
                    volume = %name,
                    backing_file = %created.backing_file.display(),
                    filesystem = %created.filesystem,
                    size = %created.size_bytes,
                    "Created volume"
                );
                Ok(created)
            }
            Err(e) => {
                self.abandon_create(&volume, true).await;
                Err(e)
            }
        }
    }

    /// Roll back a fresh create: delete the backing file if this call made
    /// it, drop the pending record and release the shared mount.
    ///
    /// If the record cannot be dropped it stays pending, keeps its shared
    /// mount reference and is completed by the next identical create.
    async fn abandon_create(&self, volume: &BlockVolume, allocated: bool) {
        if allocated {
            if let Err(e) = self.blocks.delete(&volume.backing_file).await {
                tracing::warn!(
                    volume = %volume.name,
                    error = %e,
                    "Failed to delete backing file during rollback"
                );
            }
        }
        if let Err(e) = self.commit(&volume.name, None).await {
            tracing::warn!(
                volume = %volume.name,
                error = %e,
                "Failed to drop pending record during rollback"
            );
            return;
        }
        self.release_quietly(&volume.shared_mount).await;
    }

    /// Complete a record left behind by an interrupted create.
    async fn finish_create(&self, volume: BlockVolume) -> BlockResult<BlockVolume> {
        tracing::info!(volume = %volume.name, "Completing interrupted volume creation");
        self.mounts.ensure_live(&volume.shared_mount).await?;
        self.blocks.delete(&volume.backing_file).await?;
        self.blocks
            .allocate(&volume.backing_file, volume.size_bytes)
            .await?;
        self.format_and_commit(volume).await
    }

    async fn format_and_commit(&self, mut volume: BlockVolume) -> BlockResult<BlockVolume> {
        self.blocks
            .format(&volume.backing_file, volume.filesystem)
            .await?;
        volume.created = true;
        self.commit(&volume.name, Some(volume.clone())).await?;
        Ok(volume)
    }

    async fn remove(&self, name: &str) -> BlockResult<()> {
        let _guard = self.locks.lock(name).await;
        let current = self.lookup(name)?;
        if current.is_mounted() {
            return Err(BlockError::InUse {
                name: name.to_string(),
                mount_count: current.mount_count,
            });
        }

        self.mounts.ensure_live(&current.shared_mount).await?;
        let mut volume = current.clone();
        if self.teardown(&mut volume).await? {
            tracing::warn!(volume = %name, "Tore down leftover mount before removal");
        }
        self.blocks.delete(&volume.backing_file).await?;
        if let Err(e) = remove_dir_if_exists(&volume.mount_point).await {
            tracing::warn!(
                volume = %name,
                mount_point = %volume.mount_point.display(),
                error = %e,
                "Failed to remove mount point"
            );
        }

        self.commit(name, None).await?;
        self.locks.forget(name);
        self.release_quietly(&current.shared_mount).await;

        tracing::info!(volume = %name, "Removed volume");
        Ok(())
    }

    async fn mount(&self, name: &str, id: &str) -> BlockResult<PathBuf> {
        let _guard = self.locks.lock(name).await;
        let current = self.lookup(name)?;
        if !current.created {
            return Err(BlockError::InvalidState {
                name: name.to_string(),
                reason: "volume creation did not finish, create it again".to_string(),
            });
        }
        let mount_count = current.mount_count.checked_add(1).ok_or_else(|| {
            BlockError::InvalidState {
                name: name.to_string(),
                reason: "mount count overflow".to_string(),
            }
        })?;

        self.mounts.ensure_live(&current.shared_mount).await?;
        let mut next = current.clone();
        self.heal(&mut next).await?;

        let first = next.mount_count == 0;
        if first {
            let device = self.blocks.attach(&next.backing_file).await?;
            if let Err(e) = self
                .blocks
                .mount_device(&device, &next.mount_point, next.filesystem)
                .await
            {
                self.detach_quietly(&device).await;
                return Err(e);
            }
            next.loop_device = Some(device);
        }
        next.mount_count = mount_count;

        if let Err(e) = self.commit(name, Some(next.clone())).await {
            if first {
                let mut undo = next.clone();
                undo.mount_count = 0;
                if let Err(cleanup) = self.teardown(&mut undo).await {
                    tracing::warn!(volume = %name, error = %cleanup, "Failed to undo mount");
                }
            }
            return Err(e);
        }

        tracing::info!(
            volume = %name,
            mount_id = %id,
            mount_count = next.mount_count,
            mount_point = %next.mount_point.display(),
            "Mounted volume"
        );
        Ok(next.mount_point)
    }

    async fn unmount(&self, name: &str, id: &str) -> BlockResult<()> {
        let _guard = self.locks.lock(name).await;
        let current = self.lookup(name)?;
        if !current.is_mounted() {
            return Err(BlockError::InvalidState {
                name: name.to_string(),
                reason: "volume is not mounted".to_string(),
            });
        }

        let mut next = current.clone();
        next.mount_count -= 1;
        if next.mount_count == 0 {
            self.teardown(&mut next).await?;
        }
        self.commit(name, Some(next.clone())).await?;

        tracing::info!(
            volume = %name,
            mount_id = %id,
            mount_count = next.mount_count,
            "Unmounted volume"
        );
        Ok(())
    }

    async fn reconcile(&self, name: &str) -> BlockResult<BlockVolume> {
        let _guard = self.locks.lock(name).await;
        let current = self.lookup(name)?;

        self.mounts.ensure_live(&current.shared_mount).await?;
        let mut next = current.clone();
        if self.heal(&mut next).await? {
            tracing::info!(volume = %name, "Reconciled volume with live state");
        }
        if next != current {
            self.commit(name, Some(next.clone())).await?;
        }
        Ok(next)
    }

    /// Bring the live system in line with `volume.mount_count`.
    ///
    /// While mounted the backing file must be bound to exactly one loop
    /// device which is mounted at the mount point; while unmounted nothing
    /// may be bound or mounted. Corrects `volume.loop_device` and returns
    /// whether anything had drifted.
    async fn heal(&self, volume: &mut BlockVolume) -> BlockResult<bool> {
        if !volume.is_mounted() {
            let repaired = self.teardown(volume).await?;
            if repaired {
                tracing::warn!(
                    volume = %volume.name,
                    "Unmounted volume still had live state, tore it down"
                );
            }
            return Ok(repaired);
        }

        let bound = self.blocks.devices_for(&volume.backing_file).await?;
        let mounted = self.blocks.mounted_at(&volume.mount_point).await?;
        let mut repaired = false;

        let serving = mounted.as_ref().and_then(|entry| {
            bound
                .iter()
                .find(|device| Path::new(&entry.source) == device.as_path())
                .cloned()
        });

        let device = match (serving, &mounted) {
            (Some(device), _) => device,
            (None, mounted) => {
                if let Some(entry) = mounted {
                    tracing::warn!(
                        volume = %volume.name,
                        source = %entry.source,
                        "Mount point serves a different device, unmounting it"
                    );
                    self.blocks.unmount(&volume.mount_point).await?;
                }

                let reusable = volume
                    .loop_device
                    .as_ref()
                    .filter(|device| bound.contains(device))
                    .or_else(|| bound.first())
                    .cloned();
                let device = match reusable {
                    Some(device) => device,
                    None => {
                        tracing::warn!(
                            volume = %volume.name,
                            recorded = ?volume.loop_device,
                            "Loop device lost, re-attaching backing file"
                        );
                        self.blocks.attach(&volume.backing_file).await?
                    }
                };

                tracing::warn!(
                    volume = %volume.name,
                    device = %device.display(),
                    "Mounted volume missing from mount table, re-mounting"
                );
                self.blocks
                    .mount_device(&device, &volume.mount_point, volume.filesystem)
                    .await?;
                repaired = true;
                device
            }
        };

        for stray in bound.iter().filter(|d| **d != device) {
            tracing::warn!(
                volume = %volume.name,
                device = %stray.display(),
                "Detaching extra loop device"
            );
            self.blocks.detach(stray).await?;
            repaired = true;
        }

        if volume.loop_device.as_ref() != Some(&device) {
            tracing::debug!(
                volume = %volume.name,
                recorded = ?volume.loop_device,
                actual = %device.display(),
                "Correcting recorded loop device"
            );
            volume.loop_device = Some(device);
            repaired = true;
        }
        Ok(repaired)
    }

    /// Unmount the mount point and detach every loop device bound to the
    /// backing file. Returns whether anything was live or recorded.
    ///
    /// A recorded device no longer bound to this file may belong to another
    /// volume by now and is left alone.
    async fn teardown(&self, volume: &mut BlockVolume) -> BlockResult<bool> {
        let mut found = false;
        if self.blocks.is_mounted(&volume.mount_point).await? {
            self.blocks.unmount(&volume.mount_point).await?;
            found = true;
        }
        for device in self.blocks.devices_for(&volume.backing_file).await? {
            self.blocks.detach(&device).await?;
            found = true;
        }
        if volume.loop_device.take().is_some() {
            found = true;
        }
        Ok(found)
    }

    /// Replace the record of `name` (or drop it) and persist the result.
    ///
    /// The snapshot is swapped only after the save succeeded.
    async fn commit(&self, name: &str, record: Option<BlockVolume>) -> BlockResult<()> {
        let _persist = self.persist.lock().await;
        let mut next = self.volumes.read().clone();
        match record {
            Some(volume) => {
                next.insert(name.to_string(), volume);
            }
            None => {
                next.remove(name);
            }
        }
        self.store.save(&next).await?;
        *self.volumes.write() = next;
        Ok(())
    }

    fn lookup(&self, name: &str) -> BlockResult<BlockVolume> {
        self.volumes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BlockError::NotFound(name.to_string()))
    }

    async fn release_quietly(&self, shared_mount: &Path) {
        if let Err(e) = self.mounts.release(shared_mount).await {
            tracing::warn!(
                path = %shared_mount.display(),
                error = %e,
                "Failed to release shared mount"
            );
        }
    }

    async fn detach_quietly(&self, device: &Path) {
        if let Err(e) = self.blocks.detach(device).await {
            tracing::warn!(device = %device.display(), error = %e, "Failed to detach loop device");
        }
    }
}
