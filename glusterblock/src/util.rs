use std::path::Path;

use crate::errors::{BlockError, BlockResult};

/// Convert a path into a command line argument.
///
/// Host utilities receive paths as UTF-8 strings; anything else is refused
/// instead of being passed on lossily.
pub(crate) fn path_arg(path: &Path) -> BlockResult<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| BlockError::InvalidArgument(format!("non UTF-8 path: {}", path.display())))
}

/// Remove an empty directory, ignoring a directory that is already gone.
pub(crate) async fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Whether the current process runs with root privileges.
pub fn is_privileged() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    #[test]
    fn test_path_arg() {
        assert_eq!(path_arg(Path::new("/data/db.img")).unwrap(), "/data/db.img");

        let invalid = Path::new(OsStr::from_bytes(b"/data/\xff.img"));
        assert!(matches!(
            path_arg(invalid),
            Err(BlockError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_dir_if_exists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("mnt");
        std::fs::create_dir(&dir).unwrap();

        remove_dir_if_exists(&dir).await.unwrap();
        assert!(!dir.exists());
        remove_dir_if_exists(&dir).await.unwrap();
    }
}
