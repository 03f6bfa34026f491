//! Constants for the volume driver.
//!
//! Centralized location for hardcoded names, paths and defaults.

/// Environment variables read at startup.
pub mod envs {
    /// GlusterFS volfile servers, comma or space separated.
    pub const SERVERS: &str = "SERVERS";

    /// Remote GlusterFS volume holding the backing files.
    pub const VOLUME_NAME: &str = "VOLUME_NAME";

    /// Space separated `key=value` driver and GlusterFS client options.
    pub const OPTIONS: &str = "OPTIONS";

    /// Log verbosity (`TRACE`, `DEBUG`, `INFO`, `WARNING`, `ERROR`, ...).
    pub const LOGLEVEL: &str = "LOGLEVEL";
}

/// Keys in `OPTIONS` consumed by the driver itself.
pub mod driver_options {
    pub const DEDICATED_MOUNT: &str = "dedicated-mount";
    pub const FILESYSTEM: &str = "filesystem";
    pub const FILENAME_FORMAT: &str = "filename-format";
    pub const DEFAULT_SIZE: &str = "default-size";
}

/// Keys accepted in per-volume create options.
pub mod create_options {
    pub const FILESYSTEM: &str = "filesystem";
    pub const SIZE: &str = "size";
    pub const FILENAME_FORMAT: &str = "filename-format";

    pub const ALL: &[&str] = &[FILESYSTEM, SIZE, FILENAME_FORMAT];
}

/// Driver root layout.
pub mod layout {
    /// Default data root of the plugin.
    pub const DEFAULT_ROOT: &str = "/data";

    /// Persisted state file name, directly under the root.
    pub const STATE_FILE: &str = "gluster-block-file-state.json";

    /// Lock file guarding the root against a second driver process.
    pub const LOCK_FILE: &str = ".lock";

    /// Subdirectory holding GlusterFS mount points.
    pub const GLUSTER_DIR: &str = "gluster";

    /// Subdirectory holding per-volume mount points.
    pub const VOLUMES_DIR: &str = "volumes";
}

/// Driver defaults.
pub mod defaults {
    use crate::types::Bytes;

    /// Backing file size when neither the process nor the volume sets one.
    pub const SIZE: Bytes = Bytes::from_gib(1);

    /// Retries after a failed GlusterFS mount before giving up.
    pub const MOUNT_RETRIES: u32 = 3;

    /// First retry delay in milliseconds, doubled for each further attempt.
    pub const RETRY_BACKOFF_MS: u64 = 500;
}

/// State file schema version written by this build.
pub const STATE_VERSION: u32 = 1;

/// Host commands invoked by the driver.
pub mod programs {
    pub const GLUSTERFS: &str = "glusterfs";
    pub const UMOUNT: &str = "umount";
    pub const MOUNT: &str = "mount";
    pub const LOSETUP: &str = "losetup";
}

/// Mount table consulted for live mount state.
pub const MOUNT_TABLE: &str = "/proc/self/mounts";
