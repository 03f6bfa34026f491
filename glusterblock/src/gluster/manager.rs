//! Reference counted GlusterFS mounts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{GlusterConfig, options};
use crate::constants::programs;
use crate::errors::{BlockError, BlockResult};
use crate::host::Host;
use crate::mounttab;
use crate::util::{path_arg, remove_dir_if_exists};

/// A GlusterFS mount shared by one or more logical volumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedMount {
    /// Local mount point.
    pub path: PathBuf,
    /// Remote `servers:/volume` the mount point serves.
    pub source: String,
    /// Logical volumes whose backing file lives on this mount.
    pub refs: usize,
}

/// Owns every GlusterFS mount the driver made.
///
/// The reference table has its own lock, independent of the per-volume
/// locks held by the coordinator. Counts change only while it is held, and
/// it stays held across the mount or unmount command so two volumes never
/// race to mount the same path.
#[derive(Debug)]
pub struct SharedMountManager {
    host: Arc<dyn Host>,
    config: GlusterConfig,
    base_dir: PathBuf,
    mounts: Mutex<HashMap<PathBuf, SharedMount>>,
}

impl SharedMountManager {
    pub fn new(host: Arc<dyn Host>, config: GlusterConfig, base_dir: PathBuf) -> Self {
        Self {
            host,
            config,
            base_dir,
            mounts: Mutex::new(HashMap::new()),
        }
    }

    /// Mount point serving the backing file of `volume`.
    ///
    /// Shared mode maps every volume to one mount; dedicated mode gives each
    /// volume its own.
    pub fn mount_path_for(&self, volume: &str) -> PathBuf {
        if self.config.dedicated_mount {
            self.base_dir
                .join(format!("{}-{}", self.config.volume_name, volume))
        } else {
            self.base_dir.join(&self.config.volume_name)
        }
    }

    /// Rebuild reference counts from persisted volumes without mounting.
    ///
    /// Liveness is checked lazily by [`Self::ensure_live`] when a volume is
    /// next used.
    pub async fn restore<I>(&self, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut mounts = self.mounts.lock().await;
        for path in paths {
            mounts
                .entry(path.clone())
                .or_insert_with(|| SharedMount {
                    path,
                    source: self.config.source(),
                    refs: 0,
                })
                .refs += 1;
        }
        tracing::debug!(mounts = mounts.len(), "Restored shared mount references");
    }

    /// Take a reference on the mount serving `volume`, mounting it if needed.
    pub async fn acquire(&self, volume: &str) -> BlockResult<PathBuf> {
        let path = self.mount_path_for(volume);
        let mut mounts = self.mounts.lock().await;

        if !self.is_live(&path).await? {
            self.mount_with_retry(&path).await?;
        }

        let mount = mounts.entry(path.clone()).or_insert_with(|| SharedMount {
            path: path.clone(),
            source: self.config.source(),
            refs: 0,
        });
        mount.refs += 1;

        tracing::debug!(
            volume,
            path = %path.display(),
            refs = mount.refs,
            "Acquired shared mount"
        );
        Ok(path)
    }

    /// Drop a reference; unmount when it was the last one.
    ///
    /// If the unmount fails the entry stays with zero references so that
    /// [`Self::shutdown`] can retry it.
    pub async fn release(&self, path: &Path) -> BlockResult<()> {
        let mut mounts = self.mounts.lock().await;
        let Some(mount) = mounts.get_mut(path) else {
            return Err(BlockError::Internal(format!(
                "release of untracked shared mount {}",
                path.display()
            )));
        };

        mount.refs = mount.refs.saturating_sub(1);
        tracing::debug!(path = %path.display(), refs = mount.refs, "Released shared mount");
        if mount.refs > 0 {
            return Ok(());
        }

        self.teardown(path).await?;
        mounts.remove(path);
        Ok(())
    }

    /// Verify the mount is present in the mount table and remount it if not.
    pub async fn ensure_live(&self, path: &Path) -> BlockResult<()> {
        let _mounts = self.mounts.lock().await;
        if self.is_live(path).await? {
            return Ok(());
        }
        tracing::warn!(
            path = %path.display(),
            "Shared mount recorded but not mounted, remounting"
        );
        self.mount_with_retry(path).await
    }

    /// Current mounts and their reference counts, sorted by path.
    pub async fn snapshot(&self) -> Vec<SharedMount> {
        let mounts = self.mounts.lock().await;
        let mut all: Vec<SharedMount> = mounts.values().cloned().collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all
    }

    /// Unmount every mount no volume depends on any more.
    pub async fn shutdown(&self) -> BlockResult<()> {
        let mut mounts = self.mounts.lock().await;
        let idle: Vec<PathBuf> = mounts
            .values()
            .filter(|m| m.refs == 0)
            .map(|m| m.path.clone())
            .collect();

        for path in idle {
            self.teardown(&path).await?;
            mounts.remove(&path);
        }
        tracing::debug!(remaining = mounts.len(), "Shared mount manager shut down");
        Ok(())
    }

    async fn is_live(&self, path: &Path) -> BlockResult<bool> {
        let table = self
            .host
            .mount_table()
            .await
            .map_err(|e| BlockError::io("failed to read mount table", e))?;
        Ok(mounttab::find(&table, path).is_some())
    }

    async fn mount_with_retry(&self, path: &Path) -> BlockResult<()> {
        tokio::fs::create_dir_all(path).await.map_err(|e| {
            BlockError::io(
                format!("failed to create mount point {}", path.display()),
                e,
            )
        })?;

        let args = self.mount_args(path)?;
        let attempts = self.config.mount_retries + 1;
        let mut backoff = self.config.retry_backoff;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                tracing::info!(
                    path = %path.display(),
                    "Retrying GlusterFS mount (attempt {}/{}) in {:?}",
                    attempt,
                    attempts,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }

            match self.host.run(programs::GLUSTERFS, &args).await {
                Ok(output) if output.success() => {
                    // a zero exit does not guarantee the mount came up
                    if self.is_live(path).await? {
                        tracing::info!(
                            source = %self.config.source(),
                            path = %path.display(),
                            "Mounted GlusterFS volume"
                        );
                        return Ok(());
                    }
                    last_error = "mount did not appear in the mount table".to_string();
                }
                Ok(output) => last_error = output.to_string(),
                Err(e) => last_error = format!("failed to run {}: {e}", programs::GLUSTERFS),
            }
            tracing::warn!(
                path = %path.display(),
                attempt,
                error = %last_error,
                "GlusterFS mount attempt failed"
            );
        }

        Err(BlockError::Connection(format!(
            "mounting {} at {} failed after {} attempts: {}",
            self.config.source(),
            path.display(),
            attempts,
            last_error
        )))
    }

    fn mount_args(&self, path: &Path) -> BlockResult<Vec<String>> {
        let mut args: Vec<String> = self
            .config
            .servers
            .iter()
            .map(|server| format!("--volfile-server={server}"))
            .collect();
        args.push(format!("--volfile-id={}", self.config.volume_name));
        args.extend(options::to_mount_args(&self.config.options));
        args.push(path_arg(path)?);
        Ok(args)
    }

    async fn teardown(&self, path: &Path) -> BlockResult<()> {
        if self.is_live(path).await? {
            let output = self
                .host
                .run(programs::UMOUNT, &[path_arg(path)?])
                .await
                .map_err(|e| BlockError::io(format!("failed to run {}", programs::UMOUNT), e))?;
            if !output.success() {
                return Err(BlockError::command(
                    format!("failed to unmount {}", path.display()),
                    output.to_string(),
                ));
            }
            tracing::info!(path = %path.display(), "Unmounted GlusterFS volume");
        }

        if let Err(e) = remove_dir_if_exists(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove mount point");
        }
        Ok(())
    }
}
