//! Backing file and loop device operations.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::OpenOptions;

use super::losetup;
use crate::constants::programs;
use crate::errors::{BlockError, BlockResult};
use crate::host::{CommandOutput, Host};
use crate::mounttab::{self, MountEntry};
use crate::types::{Bytes, Filesystem};
use crate::util::path_arg;

/// Creates, formats, attaches and mounts backing files.
///
/// Stateless apart from the host handle: every call observes the live
/// system, so callers can use it to verify what persisted metadata claims.
#[derive(Debug, Clone)]
pub struct BlockFileManager {
    host: Arc<dyn Host>,
}

impl BlockFileManager {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    /// Create a sparse backing file of `size` at `path`.
    ///
    /// Fails if the file already exists so a foreign file is never reused.
    pub async fn allocate(&self, path: &Path, size: Bytes) -> BlockResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| BlockError::io(format!("failed to create {}", path.display()), e))?;

        let sized = async {
            file.set_len(size.as_bytes()).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = sized {
            drop(file);
            if let Err(cleanup) = tokio::fs::remove_file(path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %cleanup,
                    "Failed to remove partially allocated backing file"
                );
            }
            return Err(BlockError::io(
                format!("failed to allocate {} for {}", size, path.display()),
                e,
            ));
        }

        tracing::debug!(path = %path.display(), %size, "Allocated backing file");
        Ok(())
    }

    /// Format the backing file with `filesystem`.
    pub async fn format(&self, path: &Path, filesystem: Filesystem) -> BlockResult<()> {
        let program = filesystem.mkfs_program();
        let mut args: Vec<String> = filesystem
            .mkfs_force_args()
            .iter()
            .map(|arg| arg.to_string())
            .collect();
        args.push(path_arg(path)?);

        tracing::info!(path = %path.display(), %filesystem, "Formatting backing file");
        let output = self
            .host
            .run(&program, &args)
            .await
            .map_err(|e| BlockError::Format(format!("failed to run {program}: {e}")))?;

        if !output.success() {
            return Err(BlockError::Format(format!(
                "{program} on {} failed with {output}",
                path.display()
            )));
        }
        Ok(())
    }

    /// Bind the backing file to a free loop device.
    pub async fn attach(&self, path: &Path) -> BlockResult<PathBuf> {
        let args = vec![
            "--find".to_string(),
            "--show".to_string(),
            path_arg(path)?,
        ];
        let output = self.losetup(&args).await?;

        if !output.success() {
            let diagnostic = output.diagnostic();
            if losetup::is_exhausted(&diagnostic) {
                return Err(BlockError::ResourceExhausted(diagnostic));
            }
            return Err(BlockError::command(
                format!("failed to attach {}", path.display()),
                output.to_string(),
            ));
        }

        let device = losetup::parse_attached(&output.stdout).ok_or_else(|| {
            BlockError::command(
                format!("failed to attach {}", path.display()),
                format!("unexpected losetup output '{}'", output.stdout.trim()),
            )
        })?;

        tracing::debug!(path = %path.display(), device = %device.display(), "Attached loop device");
        Ok(device)
    }

    /// Release a loop device. Detaching a free device is a no-op.
    pub async fn detach(&self, device: &Path) -> BlockResult<()> {
        let args = vec!["--detach".to_string(), path_arg(device)?];
        let output = self.losetup(&args).await?;

        if output.success() {
            tracing::debug!(device = %device.display(), "Detached loop device");
            return Ok(());
        }
        if losetup::is_not_attached(&output.diagnostic()) {
            tracing::debug!(device = %device.display(), "Loop device already detached");
            return Ok(());
        }
        Err(BlockError::command(
            format!("failed to detach {}", device.display()),
            output.to_string(),
        ))
    }

    /// Loop devices currently bound to `path`.
    pub async fn devices_for(&self, path: &Path) -> BlockResult<Vec<PathBuf>> {
        let args = vec!["--associated".to_string(), path_arg(path)?];
        let output = self.losetup(&args).await?;
        if !output.success() {
            return Err(BlockError::command(
                format!("failed to query loop devices of {}", path.display()),
                output.to_string(),
            ));
        }
        Ok(losetup::parse_associated(&output.stdout))
    }

    /// Delete the backing file. Refused while a loop device still holds it.
    pub async fn delete(&self, path: &Path) -> BlockResult<()> {
        let devices = self.devices_for(path).await?;
        if !devices.is_empty() {
            return Err(BlockError::io(
                format!("failed to delete {}", path.display()),
                io::Error::new(
                    io::ErrorKind::ResourceBusy,
                    format!("still attached to {}", display_devices(&devices)),
                ),
            ));
        }

        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Deleted backing file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Backing file already gone");
                Ok(())
            }
            Err(e) => Err(BlockError::io(
                format!("failed to delete {}", path.display()),
                e,
            )),
        }
    }

    /// Mount a loop device at the per-volume mount point.
    pub async fn mount_device(
        &self,
        device: &Path,
        mount_point: &Path,
        filesystem: Filesystem,
    ) -> BlockResult<()> {
        tokio::fs::create_dir_all(mount_point).await.map_err(|e| {
            BlockError::io(
                format!("failed to create mount point {}", mount_point.display()),
                e,
            )
        })?;

        let args = vec![
            "-t".to_string(),
            filesystem.as_str().to_string(),
            path_arg(device)?,
            path_arg(mount_point)?,
        ];
        let output = self.run(programs::MOUNT, &args).await?;
        if !output.success() {
            return Err(BlockError::command(
                format!(
                    "failed to mount {} at {}",
                    device.display(),
                    mount_point.display()
                ),
                output.to_string(),
            ));
        }

        tracing::info!(
            device = %device.display(),
            mount_point = %mount_point.display(),
            "Mounted volume"
        );
        Ok(())
    }

    /// Unmount the per-volume mount point if it is mounted.
    pub async fn unmount(&self, mount_point: &Path) -> BlockResult<()> {
        if self.mounted_at(mount_point).await?.is_none() {
            tracing::debug!(mount_point = %mount_point.display(), "Not mounted, nothing to unmount");
            return Ok(());
        }

        let output = self.run(programs::UMOUNT, &[path_arg(mount_point)?]).await?;
        if !output.success() {
            return Err(BlockError::command(
                format!("failed to unmount {}", mount_point.display()),
                output.to_string(),
            ));
        }
        tracing::info!(mount_point = %mount_point.display(), "Unmounted volume");
        Ok(())
    }

    /// Mount table entry at `mount_point`, if mounted.
    pub async fn mounted_at(&self, mount_point: &Path) -> BlockResult<Option<MountEntry>> {
        let table = self
            .host
            .mount_table()
            .await
            .map_err(|e| BlockError::io("failed to read mount table", e))?;
        Ok(mounttab::find(&table, mount_point))
    }

    pub async fn is_mounted(&self, mount_point: &Path) -> BlockResult<bool> {
        Ok(self.mounted_at(mount_point).await?.is_some())
    }

    async fn losetup(&self, args: &[String]) -> BlockResult<CommandOutput> {
        self.run(programs::LOSETUP, args).await
    }

    async fn run(&self, program: &str, args: &[String]) -> BlockResult<CommandOutput> {
        self.host
            .run(program, args)
            .await
            .map_err(|e| BlockError::io(format!("failed to run {program}"), e))
    }
}

fn display_devices(devices: &[PathBuf]) -> String {
    devices
        .iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SystemHost;

    fn manager() -> BlockFileManager {
        BlockFileManager::new(Arc::new(SystemHost))
    }

    #[tokio::test]
    async fn test_allocate_is_sparse_and_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.img");

        manager().allocate(&path, Bytes::from_mib(4)).await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4 * 1024 * 1024);

        let err = manager()
            .allocate(&path, Bytes::from_mib(4))
            .await
            .unwrap_err();
        assert!(matches!(err, BlockError::Io { .. }));
    }

    #[tokio::test]
    async fn test_failed_allocation_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.img");

        // larger than any file offset the kernel accepts
        let err = manager()
            .allocate(&path, Bytes::from_bytes(u64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, BlockError::Io { .. }));
        assert!(!path.exists());
    }
}
