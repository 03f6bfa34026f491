//! Driver lock preventing two processes from owning one driver root.
//!
//! Uses `flock` so that a second driver (or the CLI next to a running
//! plugin) cannot rewrite the same state file concurrently.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::errors::{BlockError, BlockResult};
use crate::layout::DriverLayout;

/// Exclusive lock on a driver root, released on drop or process exit.
#[derive(Debug)]
pub struct DriverLock {
    file: File,
    path: PathBuf,
}

impl DriverLock {
    /// Try to take the lock without blocking.
    pub fn acquire(root: &Path) -> BlockResult<Self> {
        std::fs::create_dir_all(root)
            .map_err(|e| BlockError::io(format!("failed to create {}", root.display()), e))?;

        let lock_path = DriverLayout::new(root).lock_file();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| BlockError::io("failed to open lock file", e))?;

        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Err(BlockError::InvalidState {
                    name: root.display().to_string(),
                    reason: "another driver process is already using this root".to_string(),
                });
            }
            return Err(BlockError::io("failed to acquire driver lock", err));
        }

        tracing::debug!(lock_path = %lock_path.display(), "Acquired driver lock");
        Ok(Self {
            file,
            path: lock_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DriverLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        tracing::debug!(lock_path = %self.path.display(), "Released driver lock");
    }
}
