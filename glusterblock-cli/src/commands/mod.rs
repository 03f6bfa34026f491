pub mod create;
pub mod inspect;
pub mod list;
pub mod mount;
pub mod path;
pub mod reconcile;
pub mod rm;
pub mod unmount;

/// Mount ID used when the caller does not pass one.
pub const DEFAULT_MOUNT_ID: &str = "cli";
