//! Block-file operations.
//!
//! A logical volume is a regular file on the GlusterFS mount, formatted once
//! with a local filesystem and exposed as a block device through a loop
//! device. [`BlockFileManager`] wraps the host utilities involved:
//! - `mkfs.<fs>` formats the backing file
//! - `losetup` attaches, detaches and lists loop devices
//! - `mount`/`umount` handle the per-volume mount point

mod losetup;
mod manager;

pub use manager::BlockFileManager;
