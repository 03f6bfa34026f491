//! `losetup` output handling.

use std::path::PathBuf;

/// Device paths from `losetup --associated` output.
///
/// Each line looks like `/dev/loop0: [2049]:1316 (/data/gluster/blocks/db.img)`.
pub fn parse_associated(stdout: &str) -> Vec<PathBuf> {
    stdout
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(device, _)| device.trim())
        .filter(|device| device.starts_with("/dev/"))
        .map(PathBuf::from)
        .collect()
}

/// Device path printed by `losetup --find --show`.
pub fn parse_attached(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("/dev/"))
        .map(PathBuf::from)
}

/// Whether `losetup` failed because every loop device is taken.
pub fn is_exhausted(diagnostic: &str) -> bool {
    let lower = diagnostic.to_ascii_lowercase();
    lower.contains("unused loop device") || lower.contains("free loop device")
}

/// Whether a detach failed only because the device was not attached.
pub fn is_not_attached(diagnostic: &str) -> bool {
    let lower = diagnostic.to_ascii_lowercase();
    lower.contains("no such device") || lower.contains("no such file")
}
