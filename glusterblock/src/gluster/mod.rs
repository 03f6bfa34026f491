//! GlusterFS shared mounts.
//!
//! Backing files live on a GlusterFS volume mounted under
//! `<root>/gluster`. [`SharedMountManager`] mounts it on first use, counts the
//! logical volumes depending on each mount and unmounts when the last one is
//! removed. Mount failures are retried with exponential backoff before a
//! [`crate::BlockError::Connection`] is returned.

mod manager;

pub use manager::{SharedMount, SharedMountManager};
